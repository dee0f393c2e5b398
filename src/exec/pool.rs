use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::warn;

use graph::{ChunkContext, ChunkHook, Status, StatusRecord};
use util::Timer;

use crate::fs::{Fs, StatusStore};

use super::{run_cmd::run_cmd, StopHandle};

/// How a chunk's work is actually performed, resolved at submission
/// time so workers never need to look at the graph.
pub enum ResolvedRuntime {
    /// Source nodes: nothing to do, the chunk trivially succeeds.
    Noop,
    /// A fully rendered command line, run through the shell.
    Command(String),
    /// An in-process closure.
    Callable(ChunkHook),
}

/// One unit of work: a single chunk of a single node.
pub struct ChunkJob {
    pub ctx: ChunkContext,
    pub chunk_index: usize,
    pub nb_chunks: usize,
    pub runtime: ResolvedRuntime,
    pub pre_chunk: Option<ChunkHook>,
    pub post_chunk: Option<ChunkHook>,
}

pub struct ChunkResult {
    pub node_name: String,
    pub chunk_index: usize,
    pub status: Status,
}

/// Fixed pool of worker threads pulling chunk jobs off a shared
/// channel. Results come back on a second channel, one per job.
pub struct WorkerPool {
    job_tx: Option<Sender<ChunkJob>>,
    result_rx: Receiver<ChunkResult>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(jobs: usize, fs: Fs, store: StatusStore, stop: StopHandle) -> Self {
        let (job_tx, job_rx) = channel::<ChunkJob>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, result_rx) = channel();

        let mut handles = Vec::with_capacity(jobs);
        for _ in 0..jobs {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let fs = fs.clone();
            let store = store.clone();
            let stop = stop.clone();
            handles.push(thread::spawn(move || loop {
                // hold the lock only while receiving, not while working
                let job = { job_rx.lock().expect("job channel lock").recv() };
                let Ok(job) = job else { break };
                let result = run_chunk(job, &fs, &store, &stop);
                if result_tx.send(result).is_err() {
                    break;
                }
            }));
        }
        Self {
            job_tx: Some(job_tx),
            result_rx,
            handles,
        }
    }

    pub fn submit(&self, job: ChunkJob) {
        self.job_tx
            .as_ref()
            .expect("pool is running")
            .send(job)
            .expect("worker pool hung up");
    }

    /// Block until the next chunk result arrives.
    pub fn recv(&self) -> ChunkResult {
        self.result_rx.recv().expect("worker pool hung up")
    }

    /// Close the job channel and wait for all workers to exit.
    pub fn shutdown(mut self) {
        self.job_tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Execute one chunk, persisting every status transition before and
/// after the user code runs.
fn run_chunk(job: ChunkJob, fs: &Fs, store: &StatusStore, stop: &StopHandle) -> ChunkResult {
    let ctx = &job.ctx;
    let mut buf = PathBuf::with_capacity(256);
    let status_path = fs
        .status_file(&ctx.folder, job.chunk_index, &mut buf)
        .to_path_buf();

    let mut record = StatusRecord::new(
        &ctx.node_name,
        &ctx.node_type,
        &ctx.uid,
        job.chunk_index,
        job.nb_chunks,
    );

    let finish = |record: &mut StatusRecord, status: Status| {
        record.status = status;
        if let Err(e) = store.write(fs, &status_path, record) {
            warn!("could not write status file {status_path:?}: {e:#}");
        }
        ChunkResult {
            node_name: ctx.node_name.clone(),
            chunk_index: job.chunk_index,
            status,
        }
    };

    // a stop may have landed between submission and pickup; the chunk
    // never started, so it goes back to None and stays submittable
    if stop.is_stopped() {
        return finish(&mut record, Status::None);
    }

    if let ResolvedRuntime::Command(cmd) = &job.runtime {
        record.command_line = Some(cmd.clone());
    }
    record.status = Status::Running;
    if let Err(e) = store.write(fs, &status_path, &mut record) {
        record.error_message = Some(format!("{e:#}"));
        return finish(&mut record, Status::Error);
    }

    let timer = Timer::now();
    // a panicking hook or callable must still produce a result, or the
    // scheduler would wait for this chunk forever
    let user_code = std::panic::AssertUnwindSafe(|| -> anyhow::Result<()> {
        if let Some(hook) = &job.pre_chunk {
            hook(ctx)?;
        }
        match &job.runtime {
            ResolvedRuntime::Noop => {}
            ResolvedRuntime::Callable(hook) => hook(ctx)?,
            ResolvedRuntime::Command(cmd) => {
                match run_cmd(cmd, &ctx.folder, job.chunk_index, fs, stop)? {
                    Some(0) => record.return_code = Some(0),
                    Some(code) => {
                        record.return_code = Some(code);
                        anyhow::bail!("command exited with code {code}");
                    }
                    None => anyhow::bail!("command was killed"),
                }
            }
        }
        if let Some(hook) = &job.post_chunk {
            hook(ctx)?;
        }
        Ok(())
    });
    let outcome: anyhow::Result<()> = match std::panic::catch_unwind(user_code) {
        Ok(outcome) => outcome,
        Err(payload) => Err(anyhow::anyhow!("chunk panicked: {}", panic_message(&*payload))),
    };
    record.elapsed_secs = timer.elapsed_secs();

    match outcome {
        Ok(()) => finish(&mut record, Status::Success),
        Err(e) => {
            record.error_message = Some(format!("{e:#}"));
            let status = if stop.is_stopped() {
                Status::Stopped
            } else {
                Status::Error
            };
            finish(&mut record, status)
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
