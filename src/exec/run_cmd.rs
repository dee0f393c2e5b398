use std::fs::File;
use std::io::{stderr, stdout, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::fs::Fs;

use super::StopHandle;

/// Run a chunk's command line through `sh -c`, with the node's cache
/// folder as the working directory. stdout and stderr are teed to the
/// chunk's log file and to our own stdio.
/// Based on:
/// <https://stackoverflow.com/questions/66060139/how-to-tee-stdout-stderr-from-a-subprocess-in-rust>
///
/// Returns the exit code, or `None` if the process died to a signal
/// (including our own kill on a stop request).
pub fn run_cmd(
    command_line: &str,
    node_dir: &Path,
    chunk: usize,
    fs: &Fs,
    stop: &StopHandle,
) -> Result<Option<i32>> {
    let mut buf = PathBuf::with_capacity(256);
    let log_file = fs
        .create_file(fs.log_file(node_dir, chunk, &mut buf))
        .context("creating chunk log file")?;
    let err_file = log_file.try_clone().context("cloning log file handle")?;

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command_line)
        .current_dir(node_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawning \"{command_line}\""))?;

    let child_out = child.stdout.take().expect("Cannot attach to child stdout");
    let child_err = child.stderr.take().expect("Cannot attach to child stderr");

    let thread_out = thread::spawn(move || {
        communicate(child_out, log_file, stdout()).expect("error communicating with child stdout")
    });
    let thread_err = thread::spawn(move || {
        communicate(child_err, err_file, stderr()).expect("error communicating with child stderr")
    });

    // poll instead of blocking in wait(), so a stop request can take the
    // child down mid-run
    let status = loop {
        if let Some(status) = child.try_wait().context("waiting on child process")? {
            break status;
        }
        if stop.is_stopped() {
            // the child may exit on its own first; a failed kill is fine
            let _ = child.kill();
        }
        thread::sleep(Duration::from_millis(25));
    };

    thread_out.join().expect("Error joining stdout thread");
    thread_err.join().expect("Error joining stderr thread");

    Ok(status.code())
}

fn communicate<R: Read, W: Write>(
    mut stream: R,
    mut file: File,
    mut output: W,
) -> std::io::Result<()> {
    let mut buf = [0u8; 1024];
    loop {
        let num_read = stream.read(&mut buf)?;
        if num_read == 0 {
            break;
        }

        let buf = &buf[..num_read];
        file.write_all(buf)?;
        output.write_all(buf)?;
    }

    Ok(())
}
