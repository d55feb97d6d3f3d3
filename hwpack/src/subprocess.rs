// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Running external commands. */

use {
    crate::error::{HwpackError, Result},
    duct::{cmd, Expression},
    log::debug,
    std::process::Output,
};

fn expression(argv: &[String]) -> Result<Expression> {
    let (program, args) = argv.split_first().ok_or_else(|| HwpackError::SubcommandFailed {
        argv: vec![],
        stdout: String::new(),
        stderr: "empty command".to_string(),
    })?;

    Ok(cmd(program, args).env("LC_ALL", "C"))
}

fn check(argv: Vec<String>, output: Output) -> Result<Output> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(HwpackError::SubcommandFailed {
            argv,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Run a command, capturing its output.
///
/// A non-zero exit is reported as [HwpackError::SubcommandFailed].
pub fn run(argv: &[String]) -> Result<Output> {
    debug!("running {:?}", argv);

    let output = expression(argv)?
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()?;

    check(argv.to_vec(), output)
}

/// Run `producer | consumer`, waiting on both.
///
/// The pipeline fails if either side exits non-zero.
pub fn run_pipeline(producer: &[String], consumer: &[String]) -> Result<Output> {
    debug!("running {:?} | {:?}", producer, consumer);

    let output = expression(producer)?
        .pipe(expression(consumer)?)
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()?;

    let argv = producer
        .iter()
        .cloned()
        .chain(std::iter::once("|".to_string()))
        .chain(consumer.iter().cloned())
        .collect();

    check(argv, output)
}
