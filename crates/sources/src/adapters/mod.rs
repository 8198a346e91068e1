mod common;
mod ensemble_global;
mod global;
mod regional;
mod tropical_deterministic;
mod tropical_ensemble;

pub use ensemble_global::EnsembleGlobalAdapter;
pub use global::GlobalAdapter;
pub use regional::RegionalAdapter;
pub use tropical_deterministic::TropicalDeterministicAdapter;
pub use tropical_ensemble::TropicalEnsembleAdapter;
