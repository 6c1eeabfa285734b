//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check interface names/ports are present and unique
//! - Validate value ranges (poll interval > 0, docroot non-empty)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: WebConfig → Result<(), Vec<ValidationError>>
//! - Runs before a config is accepted into the system (load and reload)

use std::collections::HashSet;

use crate::config::schema::WebConfig;

/// One semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no listening interfaces configured")]
    NoInterfaces,
    #[error("interface {0} has an empty name")]
    EmptyInterfaceName(usize),
    #[error("duplicate interface name: {0}")]
    DuplicateInterfaceName(String),
    #[error("duplicate interface port: {0}")]
    DuplicateInterfacePort(u16),
    #[error("interface name {0:?} may not contain '/'")]
    InterfaceNameHasSlash(String),
    #[error("content.docroot is empty")]
    EmptyDocroot,
    #[error("delivery.poll_interval_ms must be greater than zero")]
    ZeroPollInterval,
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &WebConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.interfaces.is_empty() {
        errors.push(ValidationError::NoInterfaces);
    }

    let mut names = HashSet::new();
    let mut ports = HashSet::new();
    for (i, iface) in config.interfaces.iter().enumerate() {
        if iface.name.is_empty() {
            errors.push(ValidationError::EmptyInterfaceName(i));
        } else if iface.name.contains('/') {
            errors.push(ValidationError::InterfaceNameHasSlash(iface.name.clone()));
        }
        if !names.insert(iface.name.clone()) {
            errors.push(ValidationError::DuplicateInterfaceName(iface.name.clone()));
        }
        if !ports.insert(iface.port) {
            errors.push(ValidationError::DuplicateInterfacePort(iface.port));
        }
    }

    if config.content.docroot.is_empty() {
        errors.push(ValidationError::EmptyDocroot);
    }
    if config.delivery.poll_interval_ms == 0 {
        errors.push(ValidationError::ZeroPollInterval);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
