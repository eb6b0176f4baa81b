//! The mica compositor server: message dispatch, transport, font
//! provisioning, and nested-mode glue. The binary entry point in
//! `main.rs` wires these modules to the CLI and the runtime.

pub mod fonts;
pub mod nested;
pub mod server;
pub mod transport;

/// Default server identity; nested instances append `-nest-<pid>`.
pub const DEFAULT_IDENT: &str = "compositor";

/// Socket path for a server identity.
pub fn socket_path(ident: &str) -> std::path::PathBuf {
    std::path::PathBuf::from(format!("/tmp/{ident}.sock"))
}
