// Licensed under the Apache-2.0 license

//! Short-lived AES operation actors, one thread per request.

use crate::ipc::{JobId, OperationRequest, OperationResult, RequestOutput, Shutdown, UiEvent};
use fpga_aes::{Aes, AesDelivery, AesOutput};
use log::{debug, warn};
use std::io;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often a waiting job looks at the shutdown token.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Runs `request` on its own thread and sends exactly one
/// [`UiEvent::Aes`] for it.
pub fn spawn(
    job: JobId,
    aes: Arc<Aes>,
    request: OperationRequest,
    events: Sender<UiEvent>,
    shutdown: Shutdown,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("aes-job-{job}"))
        .spawn(move || {
            let result = run(&aes, &request, &shutdown);
            debug!(
                "AES job {} {} {}: {}",
                job,
                request.kind,
                request.input_path.display(),
                result.outcome
            );
            let _ = events.send(UiEvent::Aes { job, result });
        })
}

/// Starts the transfer and blocks until it completes or the shutdown token
/// trips, in which case the transfer is cancelled and reported as failed.
pub fn run(aes: &Aes, request: &OperationRequest, shutdown: &Shutdown) -> OperationResult {
    let direction = request.kind.direction();
    let output = match &request.output {
        RequestOutput::File(path) => AesOutput::File(path.clone()),
        RequestOutput::Buffer { capacity } => AesOutput::Buffer(vec![0; *capacity]),
    };

    let mut pending = match aes
        .channel(direction)
        .transfer(&request.key, &request.input_path, output)
    {
        Ok(pending) => pending,
        Err(err) if err.is_busy() => return OperationResult::busy(request),
        Err(err) => {
            warn!("{} of {} failed: {}", request.kind, request.input_path.display(), err);
            return OperationResult::failed(request, err);
        }
    };

    let mut cancelled = false;
    loop {
        if let Some(outcome) = pending.wait_timeout(SHUTDOWN_POLL) {
            return match outcome {
                Ok(AesDelivery::File(_)) => OperationResult::success(request, None),
                Ok(AesDelivery::Buffer(buffer)) => OperationResult::success(request, Some(buffer)),
                Err(err) => {
                    warn!("{} of {} failed: {}", request.kind, request.input_path.display(), err);
                    OperationResult::failed(request, err)
                }
            };
        }
        if shutdown.is_triggered() && !cancelled {
            aes.cancel(direction);
            cancelled = true;
        }
    }
}
