//! Controller for the classifier attachment lifecycle.
//!
//! Owns the full life of one TC filter slot on one interface: resolve the
//! interface name to its kernel index, install the clsact qdisc that carries
//! the ingress hook, attach the classifier filter, and tear both down in
//! order on shutdown. Once the qdisc is installed, teardown is owed on every
//! exit path.

use aya::{
    Ebpf,
    programs::{SchedClassifier, TcAttachType, tc, tc::SchedClassifierLinkId},
};
use futures::TryStreamExt;
use netlink_packet_route::tc::TcHandle;
use rtnetlink::Handle;
use tracing::{debug, info, warn};
use udpecho_common::PROGRAM_NAME;

use crate::error::EchoError;

/// One network interface the classifier is bound to.
///
/// `qdisc_installed` becomes true only after a successful install and is
/// cleared only after a successful removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceBinding {
    pub name: String,
    pub index: u32,
    pub qdisc_installed: bool,
}

/// A live classifier filter under the interface's ingress hook.
#[derive(Debug)]
struct FilterAttachment {
    link_id: SchedClassifierLinkId,
}

/// Qdisc identity for `tc qdisc del dev <if> clsact`: clsact grafts at the
/// ingress parent and always carries the ffff: handle.
const CLSACT_PARENT: TcHandle = TcHandle {
    major: 0xffff,
    minor: 0xfff1,
};
const CLSACT_HANDLE: TcHandle = TcHandle {
    major: 0xffff,
    minor: 0,
};

pub struct AttachmentController {
    binding: InterfaceBinding,
    attachment: Option<FilterAttachment>,
    ebpf: Ebpf,
    netlink: Handle,
}

impl AttachmentController {
    /// Resolve an interface name to its kernel index. The kernel answers a
    /// lookup for a missing name with ENODEV.
    pub async fn resolve_interface(
        netlink: &Handle,
        name: &str,
    ) -> Result<InterfaceBinding, EchoError> {
        let mut links = netlink.link().get().match_name(name.to_string()).execute();

        match links.try_next().await {
            Ok(Some(link)) => {
                debug!(
                    event.name = "attachment.interface_resolved",
                    network.interface.name = %name,
                    network.interface.index = link.header.index,
                    "resolved interface"
                );
                Ok(InterfaceBinding {
                    name: name.to_string(),
                    index: link.header.index,
                    qdisc_installed: false,
                })
            }
            Ok(None) => Err(EchoError::interface_not_found(name)),
            Err(rtnetlink::Error::NetlinkError(message))
                if message.raw_code() == -libc::ENODEV =>
            {
                Err(EchoError::interface_not_found(name))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn new(netlink: Handle, binding: InterfaceBinding, ebpf: Ebpf) -> Self {
        AttachmentController {
            binding,
            attachment: None,
            ebpf,
            netlink,
        }
    }

    /// Install the clsact qdisc that provides the ingress hook. An already
    /// present qdisc is the steady state for a single-run tool, not an
    /// error; it is still tracked as installed so teardown removes it.
    pub fn install_qdisc(&mut self) -> Result<(), EchoError> {
        match tc::qdisc_add_clsact(&self.binding.name) {
            Ok(()) => {
                self.binding.qdisc_installed = true;
                info!(
                    event.name = "attachment.qdisc_installed",
                    network.interface.name = %self.binding.name,
                    "clsact qdisc installed"
                );
                Ok(())
            }
            Err(e) if qdisc_already_present(&e) => {
                self.binding.qdisc_installed = true;
                debug!(
                    event.name = "attachment.qdisc_already_present",
                    network.interface.name = %self.binding.name,
                    "clsact qdisc already present, treating as installed"
                );
                Ok(())
            }
            Err(source) => Err(EchoError::QdiscInstall {
                iface: self.binding.name.clone(),
                source,
            }),
        }
    }

    /// Attach the loaded classifier under the ingress hook, recording the
    /// filter for teardown. On failure the caller still owes a teardown for
    /// the qdisc installed before this.
    pub fn attach(&mut self) -> Result<(), EchoError> {
        let iface = self.binding.name.clone();
        let program: &mut SchedClassifier = self
            .ebpf
            .program_mut(PROGRAM_NAME)
            .ok_or(EchoError::ProgramMissing(PROGRAM_NAME))?
            .try_into()
            .map_err(|source| EchoError::FilterAttach {
                iface: iface.clone(),
                source,
            })?;

        let link_id = program
            .attach(&iface, TcAttachType::Ingress)
            .map_err(|source| EchoError::FilterAttach {
                iface: iface.clone(),
                source,
            })?;

        self.attachment = Some(FilterAttachment { link_id });
        info!(
            event.name = "attachment.filter_attached",
            network.interface.name = %iface,
            ebpf.program.name = PROGRAM_NAME,
            "classifier attached to ingress"
        );
        Ok(())
    }

    /// Remove the filter and then the qdisc, best-effort. Safe to call when
    /// nothing was attached and safe to call again after a partial failure;
    /// each step logs instead of aborting the rest since the process is
    /// already exiting.
    pub async fn teardown(&mut self) {
        if let Some(FilterAttachment { link_id }) = self.attachment.take() {
            match self.detach_filter(link_id) {
                Ok(()) => info!(
                    event.name = "attachment.filter_detached",
                    network.interface.name = %self.binding.name,
                    "classifier detached"
                ),
                Err(e) => warn!(
                    event.name = "attachment.filter_detach_failed",
                    network.interface.name = %self.binding.name,
                    error = %e,
                    "failed to detach classifier"
                ),
            }
        }

        if self.binding.qdisc_installed {
            match self.remove_qdisc().await {
                Ok(()) => {
                    self.binding.qdisc_installed = false;
                    info!(
                        event.name = "attachment.qdisc_removed",
                        network.interface.name = %self.binding.name,
                        "clsact qdisc removed"
                    );
                }
                Err(e) => warn!(
                    event.name = "attachment.qdisc_remove_failed",
                    network.interface.name = %self.binding.name,
                    error = %e,
                    "failed to remove clsact qdisc"
                ),
            }
        }
    }

    fn detach_filter(&mut self, link_id: SchedClassifierLinkId) -> Result<(), EchoError> {
        let iface = self.binding.name.clone();
        let program: &mut SchedClassifier = self
            .ebpf
            .program_mut(PROGRAM_NAME)
            .ok_or(EchoError::ProgramMissing(PROGRAM_NAME))?
            .try_into()
            .map_err(|source| EchoError::FilterDetach {
                iface: iface.clone(),
                source,
            })?;

        program
            .detach(link_id)
            .map_err(|source| EchoError::FilterDetach { iface, source })
    }

    async fn remove_qdisc(&mut self) -> Result<(), EchoError> {
        let mut qdisc = self.netlink.qdisc();
        let mut request = qdisc.del(self.binding.index as i32);
        let message = request.message_mut();
        message.header.parent = CLSACT_PARENT;
        message.header.handle = CLSACT_HANDLE;

        request
            .execute()
            .await
            .map_err(|source| EchoError::QdiscRemove {
                iface: self.binding.name.clone(),
                source,
            })
    }
}

/// EEXIST from the qdisc add is the one failure that means the hook is
/// already in place.
fn qdisc_already_present(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::EEXIST)
}
