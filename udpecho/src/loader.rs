//! Loading of the externally compiled classifier object.
//!
//! The port selection travels to the classifier as loader-time globals, so
//! by the time the program is verified the filter is already baked in; the
//! control plane never looks at a packet.

use std::path::Path;

use aya::{Ebpf, EbpfLoader, programs::SchedClassifier};
use aya_log::EbpfLogger;
use tracing::{debug, info};
use udpecho_common::{PORT_MAX_SYMBOL, PORT_MIN_SYMBOL, PROGRAM_NAME, PortRange};

use crate::{error::EchoError, runtime::conf::PortFilter};

/// Load the classifier object from `path` with the port selection applied,
/// and verify the `udpecho` entry point. No interface state is touched here;
/// a failure leaves nothing to clean up.
pub fn load_classifier(path: &Path, filter: PortFilter) -> Result<Ebpf, EchoError> {
    let ports: PortRange = filter.port_range();
    let must_exist = requires_port_symbols(filter);

    let mut ebpf = EbpfLoader::new()
        .set_global(PORT_MIN_SYMBOL, &ports.min, must_exist)
        .set_global(PORT_MAX_SYMBOL, &ports.max, must_exist)
        .load_file(path)
        .map_err(|source| EchoError::program_load(path, source))?;

    if let Err(e) = EbpfLogger::init(&mut ebpf) {
        // Objects built without aya-log carry no log maps.
        debug!(
            event.name = "loader.ebpf_logger_skipped",
            error = %e,
            "eBPF logger not initialized"
        );
    }

    let program: &mut SchedClassifier = ebpf
        .program_mut(PROGRAM_NAME)
        .ok_or(EchoError::ProgramMissing(PROGRAM_NAME))?
        .try_into()
        .map_err(|source| EchoError::ProgramVerify {
            name: PROGRAM_NAME,
            source,
        })?;
    program.load().map_err(|source| EchoError::ProgramVerify {
        name: PROGRAM_NAME,
        source,
    })?;

    info!(
        event.name = "loader.program_loaded",
        ebpf.program.name = PROGRAM_NAME,
        file.path = %path.display(),
        udp.port.min = ports.min,
        udp.port.max = ports.max,
        "classifier program loaded and verified"
    );

    Ok(ebpf)
}

/// A classifier built without the port globals can still serve the any-port
/// case, but silently ignoring an explicitly requested filter would be a
/// correctness bug, so the symbols become mandatory the moment one is asked
/// for.
fn requires_port_symbols(filter: PortFilter) -> bool {
    !matches!(filter, PortFilter::Any)
}
