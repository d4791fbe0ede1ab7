//! Turning a session outcome into the public result

use tracing::warn;

use crate::executor::invoke::Outcome;
use crate::executor::{ExecError, ExecutionError};
use crate::sandbox::SandboxDir;
use crate::types::ExecResult;

/// Collect the captured stream matching `outcome` and remove the scratch
/// directory.
///
/// A removal failure is reported only when nothing else went wrong; the first
/// error of a run is the one returned.
pub(crate) fn finish(
    dir: SandboxDir,
    outcome: Result<Outcome, ExecError>,
) -> Result<ExecResult, ExecError> {
    let result = match outcome {
        Ok(Outcome::Completed(metrics)) => dir
            .read_stdout()
            .map(|stdout| {
                ExecResult::new(
                    &stdout,
                    metrics.mem_size,
                    metrics.data_len,
                    metrics.fuel_consumed,
                )
            })
            .map_err(ExecError::from),
        Ok(Outcome::Faulted(fault)) => match dir.read_stderr() {
            Ok(stderr) => Err(ExecutionError { stderr, fault }.into()),
            Err(e) => Err(e.into()),
        },
        Err(e) => Err(e),
    };

    match (result, dir.close()) {
        (Ok(result), Ok(())) => Ok(result),
        (Ok(_), Err(close)) => Err(close.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close)) => {
            warn!("failed to clean up after failed run: {close}");
            Err(e)
        }
    }
}
