//! One handler per supported verb.
//!
//! Handlers compose the session, the path resolver, the lock table,
//! and the transfer worker. Every expected failure becomes a numeric
//! reply here; only a broken control stream propagates out as an
//! `io::Error`.

use crate::registry::{CommandRegistry, Preflight};

mod access;
mod fsops;
mod misc;
mod nav;
mod params;
mod xfer;

/// Registers the full verb table with its preflight assignments.
pub(crate) fn register_all(registry: &mut CommandRegistry) {
    use Preflight::{ClearBoth, ClearRenameFrom, ClearRestart, None as NoPreflight};

    registry.register("USER", ClearBoth, access::user);
    registry.register("PASS", ClearBoth, access::pass);
    registry.register("ACCT", ClearBoth, misc::not_implemented);
    registry.register("CWD", ClearBoth, nav::cwd);
    registry.register("CDUP", ClearBoth, nav::cdup);
    registry.register("SMNT", ClearBoth, misc::not_implemented);
    registry.register("QUIT", ClearBoth, access::quit);
    registry.register("REIN", ClearBoth, access::rein);
    registry.register("PORT", ClearBoth, params::port);
    registry.register("PASV", ClearBoth, params::pasv);
    registry.register("TYPE", ClearBoth, params::transfer_type);
    registry.register("STRU", ClearBoth, params::structure);
    registry.register("MODE", ClearBoth, params::mode);
    registry.register("REST", ClearRenameFrom, params::rest);
    registry.register("STOR", ClearRenameFrom, xfer::stor);
    registry.register("RETR", ClearRenameFrom, xfer::retr);
    registry.register("APPE", ClearBoth, xfer::appe);
    registry.register("LIST", ClearBoth, xfer::list);
    registry.register("NLST", ClearBoth, xfer::nlst);
    registry.register("DELE", ClearBoth, fsops::dele);
    registry.register("RMD", ClearBoth, fsops::rmd);
    registry.register("MKD", ClearBoth, fsops::mkd);
    registry.register("PWD", ClearBoth, nav::pwd);
    registry.register("ABOR", ClearBoth, xfer::abor);
    registry.register("SYST", ClearBoth, misc::syst);
    registry.register("NOOP", NoPreflight, misc::noop);
    registry.register("RNFR", ClearBoth, fsops::rnfr);
    registry.register("RNTO", ClearRestart, fsops::rnto);
    registry.register("SIZE", NoPreflight, fsops::size);
    registry.register("MDTM", NoPreflight, fsops::mdtm);
    registry.register("FEAT", NoPreflight, misc::feat);
    registry.register("STAT", NoPreflight, misc::stat);
}
