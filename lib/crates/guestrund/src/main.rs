use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use guestrund::platform::{self, DebugConsole};
use guestrund::protocol::{LAUNCH_FAILURE_CODE, MANIFEST_PATH, exit_value};
use guestrund::{Invocation, relay};

fn run(console: &mut DebugConsole) -> Result<u8> {
    platform::init().context("cannot acquire port I/O rights")?;
    let invocation = Invocation::load(Path::new(MANIFEST_PATH))?;
    let code = relay(&invocation, &mut io::stdout().lock(), console)
        .with_context(|| format!("cannot relay output of {}", invocation.program))?;
    Ok(exit_value(code))
}

fn main() {
    let mut console = DebugConsole::new();
    let value = match run(&mut console) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("guestrund: {e:#}");
            let _ = writeln!(console, "guestrund: {e:#}");
            LAUNCH_FAILURE_CODE
        }
    };
    platform::power_off(value)
}
