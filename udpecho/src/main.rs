mod attachment_controller;
mod error;
mod loader;
mod runtime;

use anyhow::Context;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::{attachment_controller::AttachmentController, runtime::Runtime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Runtime { cli, config } = Runtime::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(cli.log_level.into())
                .from_env_lossy(),
        )
        .init();

    // Bump the memlock rlimit. This is needed for older kernels that don't
    // use the new memcg based accounting, see https://lwn.net/Articles/837122/
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!("remove limit on locked memory failed, ret is: {ret}");
    }

    let (connection, netlink, _) =
        rtnetlink::new_connection().context("failed to open netlink socket")?;
    tokio::spawn(connection);

    let binding = AttachmentController::resolve_interface(&netlink, &config.interface).await?;
    let ebpf = loader::load_classifier(&config.program, config.port_filter)?;

    let mut controller = AttachmentController::new(netlink, binding, ebpf);
    controller.install_qdisc()?;
    if let Err(e) = controller.attach() {
        // The qdisc from the step above must not outlive a failed attach.
        controller.teardown().await;
        return Err(e.into());
    }

    info!(
        event.name = "udpecho.running",
        network.interface.name = %config.interface,
        "udpecho running, press Ctrl-C to exit"
    );

    wait_for_shutdown().await;

    info!(event.name = "udpecho.terminating", "udpecho terminating");
    controller.teardown().await;

    Ok(())
}

/// Block until SIGINT or SIGTERM. Resolves at most once; a second signal
/// while teardown runs has no handler to re-enter.
async fn wait_for_shutdown() {
    use tokio::signal::{
        ctrl_c,
        unix::{SignalKind, signal},
    };

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler, waiting on Ctrl-C only");
            if let Err(e) = ctrl_c().await {
                warn!(error = %e, "failed to wait for Ctrl-C");
            }
            return;
        }
    };

    tokio::select! {
        result = ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to wait for Ctrl-C");
            }
        }
        _ = sigterm.recv() => {}
    }
}
