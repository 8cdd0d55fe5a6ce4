//! Error taxonomy for the attachment lifecycle.
//!
//! Every kernel-interaction failure is terminal for the run; the variants
//! exist so callers can tell which cleanup obligation applies, not to drive
//! retries.

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EchoError {
    /// The interface name did not resolve. Nothing was touched yet.
    #[error("Interface {name} not found")]
    InterfaceNotFound { name: String },

    /// The classifier object could not be read or relocated.
    #[error("failed to load classifier object {path}: {source}")]
    ProgramLoad {
        path: PathBuf,
        #[source]
        source: aya::EbpfError,
    },

    /// The object loaded but did not contain the expected entry point.
    #[error("classifier program '{0}' not present in loaded object")]
    ProgramMissing(&'static str),

    /// The entry point exists but is not a classifier, or the kernel
    /// verifier rejected it.
    #[error("classifier program '{name}' failed verification: {source}")]
    ProgramVerify {
        name: &'static str,
        #[source]
        source: aya::programs::ProgramError,
    },

    #[error("failed to install clsact qdisc on {iface}: {source}")]
    QdiscInstall {
        iface: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove clsact qdisc from {iface}: {source}")]
    QdiscRemove {
        iface: String,
        #[source]
        source: rtnetlink::Error,
    },

    #[error("failed to attach classifier to {iface} ingress: {source}")]
    FilterAttach {
        iface: String,
        #[source]
        source: aya::programs::ProgramError,
    },

    #[error("failed to detach classifier from {iface}: {source}")]
    FilterDetach {
        iface: String,
        #[source]
        source: aya::programs::ProgramError,
    },

    #[error("netlink request failed: {0}")]
    Netlink(#[from] rtnetlink::Error),
}

impl EchoError {
    pub fn interface_not_found(name: impl Into<String>) -> Self {
        EchoError::InterfaceNotFound { name: name.into() }
    }

    pub fn program_load(path: impl Into<PathBuf>, source: aya::EbpfError) -> Self {
        EchoError::ProgramLoad {
            path: path.into(),
            source,
        }
    }
}
