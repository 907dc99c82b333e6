//! Capabilities the Kalki agent can act through, and the registry that
//! dispatches to them by name.

pub mod desktop;
pub mod echo;
pub mod params;
pub mod process;
pub mod registry;
pub mod screen;
pub mod traits;

use std::sync::Arc;

pub use desktop::{
    ClickCapability, OpenAppCapability, OpenUrlCapability, PressKeyCapability,
    SearchWebCapability, TypeTextCapability,
};
pub use echo::EchoCapability;
pub use process::RunCommandCapability;
pub use registry::{CapabilityInfo, CapabilityRecord, CapabilityRegistry, Registration};
pub use screen::{FindTextCapability, ReadScreenCapability};
pub use traits::{ActionOutcome, Capability, CapabilityError, Parameters};

/// Every built-in capability; `run_command` is limited to `allowed_commands`.
pub fn builtin_capabilities(allowed_commands: &[String]) -> Vec<Arc<dyn Capability>> {
    vec![
        Arc::new(OpenUrlCapability),
        Arc::new(SearchWebCapability),
        Arc::new(OpenAppCapability),
        Arc::new(TypeTextCapability),
        Arc::new(PressKeyCapability),
        Arc::new(ClickCapability),
        Arc::new(ReadScreenCapability),
        Arc::new(FindTextCapability),
        Arc::new(RunCommandCapability::new(allowed_commands.iter().cloned())),
        Arc::new(EchoCapability),
    ]
}
