//! Solver backends.
//!
//! A backend turns a [`Snapshot`](femrun_model::Snapshot) into the job files
//! of one external program and knows how to check, run and read that
//! program. The set is closed and selected by [`BackendKind`].
//!
//! # Backends
//!
//! - **CalculiX**: one keyword deck named after the mesh
//! - **Elmer**: start-info file, solver input file and a Gmsh script

pub mod calculix;
pub mod elmer;
pub mod traits;

pub use calculix::CalculixBackend;
pub use elmer::ElmerBackend;
pub use traits::*;

use femrun_model::BackendKind;

pub fn backend_for(kind: BackendKind) -> Box<dyn SolverBackend> {
    match kind {
        BackendKind::Calculix => Box::new(CalculixBackend),
        BackendKind::Elmer => Box::new(ElmerBackend),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;

    #[test]
    fn every_kind_has_a_backend() {
        for kind in BackendKind::ALL {
            let backend = backend_for(kind);
            assert_eq!(backend.kind(), kind);
            assert_eq!(backend.declared_stages().first(), Some(&Stage::Prepare));
        }
    }
}
