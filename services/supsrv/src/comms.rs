//! Comms pump
//!
//! The async shell around [`SupervisorCore`]: receives datagrams from the
//! transport, drives the 2 Hz tick, feeds peripheral events in, and flushes
//! the outbound queue after every step. The core itself stays synchronous
//! so no two events ever interleave inside a facility update.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use fission_comlink::transport::DatagramTransport;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::scheduler::tick_period;
use crate::supervisor::{PeripheralEvent, SupervisorCore};

/// Backoff before a crashed task restarts.
pub const TASK_RESTART_BACKOFF: Duration = Duration::from_secs(5);

fn now_ms(epoch: Instant) -> u64 {
    epoch.elapsed().as_millis() as u64
}

/// Run the comms pump until shutdown, restarting after failures with a
/// backoff (per-task supervision).
pub async fn supervise(
    core: &mut SupervisorCore,
    transport: Arc<dyn DatagramTransport>,
    mut peripherals: mpsc::Receiver<PeripheralEvent>,
    shutdown: CancellationToken,
) {
    loop {
        match pump(core, transport.clone(), &mut peripherals, &shutdown).await {
            Ok(()) => {
                info!("comms pump stopped");
                return;
            }
            Err(e) if shutdown.is_cancelled() => {
                warn!("comms pump error during shutdown: {}", e);
                return;
            }
            Err(e) => {
                error!("comms pump failed: {}, restarting in {:?}", e, TASK_RESTART_BACKOFF);
                tokio::time::sleep(TASK_RESTART_BACKOFF).await;
            }
        }
    }
}

/// One pump incarnation: open channels, then select over transport RX,
/// tick timer, peripheral events and shutdown.
async fn pump(
    core: &mut SupervisorCore,
    transport: Arc<dyn DatagramTransport>,
    peripherals: &mut mpsc::Receiver<PeripheralEvent>,
    shutdown: &CancellationToken,
) -> Result<()> {
    let (dev_listen, coord_listen) = core.listen_channels();
    transport.open(dev_listen).await?;
    transport.open(coord_listen).await?;
    info!(
        "supervisor listening: devices on {}, coordinators on {}",
        dev_listen, coord_listen
    );

    let epoch = Instant::now();
    let mut ticker = tokio::time::interval(tick_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                // Drain outstanding replies before the UI and audio stop
                flush(core, transport.as_ref()).await?;
                return Ok(());
            }
            datagram = transport.recv() => {
                let datagram = datagram?;
                core.handle_datagram(&datagram, now_ms(epoch));
                flush(core, transport.as_ref()).await?;
            }
            _ = ticker.tick() => {
                core.tick(now_ms(epoch));
                flush(core, transport.as_ref()).await?;
            }
            event = peripherals.recv() => {
                if let Some(event) = event {
                    core.handle_peripheral_event(event);
                }
            }
        }
    }
}

async fn flush(core: &mut SupervisorCore, transport: &dyn DatagramTransport) -> Result<()> {
    for frame in core.drain_outbound() {
        transport.send(frame.dst, frame.src, frame.bytes).await?;
    }
    Ok(())
}
