//! Shell Spawning on a Pseudo-Terminal
//!
//! Opens a pty pair with `portable-pty`, starts the interactive shell on the
//! slave side and bridges the blocking master I/O to tokio channels with
//! three background threads:
//!
//! - reader: master -> `output` channel, exits on EOF/EIO or when the
//!   receiver is dropped
//! - writer: `input` channel -> master, exits when every sender is dropped
//! - waiter: owns the child, reaps it and publishes the exit on a watch
//!   channel

use std::io::{Read, Write};
use std::path::Path;
use std::thread;

use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtyPair, PtySize};
use tokio::sync::{mpsc, watch};

use crate::config::TerminalConfig;
use crate::error::{Error, Result};

/// Chunks buffered between the reader thread and the attached client
const OUTPUT_BUFFER: usize = 256;

/// Chunks buffered between the client and the writer thread
const INPUT_BUFFER: usize = 64;

/// Owned pty resources of one shell
pub(crate) struct PtyHandle {
    pub master: Box<dyn MasterPty + Send>,
    pub killer: Box<dyn ChildKiller + Send + Sync>,
    pub pid: Option<u32>,
}

/// Channel ends connected to the pty threads
pub(crate) struct PtyStreams {
    pub output: mpsc::Receiver<Vec<u8>>,
    pub input: mpsc::Sender<Vec<u8>>,
    pub exited: watch::Receiver<bool>,
}

pub(crate) fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Start `config.shell` on a fresh pty with `cwd` as working directory
pub(crate) fn spawn_shell(config: &TerminalConfig, cwd: &Path) -> Result<(PtyHandle, PtyStreams)> {
    let shell = config.shell.display().to_string();
    let spawn_failed = |reason: String| Error::SpawnFailed {
        command: shell.clone(),
        reason,
    };

    let pair = native_pty_system()
        .openpty(pty_size(config.cols, config.rows))
        .map_err(|e| spawn_failed(format!("openpty: {}", e)))?;
    let PtyPair { master, slave } = pair;

    let mut builder = CommandBuilder::new(&config.shell);
    builder.args(&config.shell_args);
    builder.cwd(cwd.as_os_str());
    builder.env("TERM", &config.term);

    let mut child = slave
        .spawn_command(builder)
        .map_err(|e| spawn_failed(e.to_string()))?;
    // Only the child may hold the slave, otherwise the master never sees EOF
    drop(slave);

    let pid = child.process_id();
    let killer = child.clone_killer();

    let (reader, writer) = match (master.try_clone_reader(), master.take_writer()) {
        (Ok(reader), Ok(writer)) => (reader, writer),
        (Err(e), _) | (_, Err(e)) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(spawn_failed(format!("pty streams: {}", e)));
        }
    };

    let (output_tx, output_rx) = mpsc::channel(OUTPUT_BUFFER);
    let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
    let (exit_tx, exit_rx) = watch::channel(false);

    spawn_reader(reader, output_tx);
    spawn_writer(writer, input_rx);

    thread::spawn(move || {
        match child.wait() {
            Ok(status) => debug!("Shell exited with code {}", status.exit_code()),
            Err(e) => warn!("Failed to wait for shell: {}", e),
        }
        let _ = exit_tx.send(true);
    });

    debug!("Spawned {} on pty (pid {:?})", shell, pid);
    Ok((
        PtyHandle {
            master,
            killer,
            pid,
        },
        PtyStreams {
            output: output_rx,
            input: input_tx,
            exited: exit_rx,
        },
    ))
}

fn spawn_reader(mut reader: Box<dyn Read + Send>, output: mpsc::Sender<Vec<u8>>) {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    debug!("PTY read EOF");
                    break;
                }
                Ok(n) => {
                    if output.blocking_send(buf[..n].to_vec()).is_err() {
                        debug!("PTY output receiver dropped, stopping reader thread");
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Linux reports EIO once the slave side is gone
                    debug!("PTY read ended: {}", e);
                    break;
                }
            }
        }
        debug!("PTY reader thread exiting");
    });
}

fn spawn_writer(mut writer: Box<dyn Write + Send>, mut input: mpsc::Receiver<Vec<u8>>) {
    thread::spawn(move || {
        while let Some(data) = input.blocking_recv() {
            if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                warn!("PTY write error ({}): {}", e.kind(), e);
                break;
            }
        }
        debug!("PTY writer thread exiting");
    });
}
