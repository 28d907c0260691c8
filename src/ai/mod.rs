//! Provider catalog and local endpoint validation

pub mod openai;
pub mod probe;
pub mod provider;

pub use openai::EndpointError;
pub use probe::{ConnectivityProbe, ProbeClassification, ProbeResult};
pub use provider::{ProviderCatalog, ProviderDescriptor, ProviderKind, LOCAL_PROVIDER_ID};
