pub mod policy;
pub mod recorder;
pub mod tuner;

pub use policy::{ScalingAction, evaluate};
pub use recorder::{EventRecorder, StoreEventRecorder};
pub use tuner::{HpaTunerController, ReconcileAction, TunerContext, reconcile};
