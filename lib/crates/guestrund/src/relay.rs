//! Running the payload and relaying its output.

use std::io::{self, Read, Write};
use std::process::{Command, Stdio};

use crate::invocation::Invocation;
use crate::protocol::{PAYLOAD_END_MARKER, PAYLOAD_START_MARKER};

/// Run `invocation`, copying its combined stdout and stderr to `out` and to
/// `console`. The console copy is framed by the payload markers.
///
/// Returns the payload's exit code, or `None` if it could not be started or
/// was terminated by a signal. A start failure is reported inside the
/// markers so the harness shows it as payload output.
///
/// # Errors
///
/// Returns an error if the output pipe cannot be created or read, or if
/// writing to `out` or `console` fails.
pub fn relay(
    invocation: &Invocation,
    out: &mut impl Write,
    console: &mut impl Write,
) -> io::Result<Option<i32>> {
    writeln!(console, "{PAYLOAD_START_MARKER}")?;
    let code = run(invocation, out, console);
    writeln!(console, "{PAYLOAD_END_MARKER}")?;
    out.flush()?;
    console.flush()?;
    code
}

fn run(
    invocation: &Invocation,
    out: &mut impl Write,
    console: &mut impl Write,
) -> io::Result<Option<i32>> {
    let (mut reader, writer) = io::pipe()?;
    // The command owns the write ends; it must be gone before reading so
    // the pipe reaches EOF when the payload exits.
    let spawned = {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(writer.try_clone()?)
            .stderr(writer);
        command.spawn()
    };
    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            let message = format!("guestrund: cannot start {}: {e}\n", invocation.program);
            out.write_all(message.as_bytes())?;
            console.write_all(message.as_bytes())?;
            return Ok(None);
        }
    };

    let mut buf = [0u8; 4096];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };
        out.write_all(&buf[..n])?;
        console.write_all(&buf[..n])?;
    }
    Ok(child.wait()?.code())
}
