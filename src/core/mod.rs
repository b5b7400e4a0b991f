pub mod address;
pub mod cache;
#[cfg(test)]
pub(crate) mod fakes;
pub mod overrides;
pub mod probe;
pub mod resolver;

pub use address::{
    AddressError, BackendAddress, CandidateAddress, CandidateSet, ProbeTechnique,
    ResolutionSource, ResolvedEndpoint, VerifiedEndpoint,
};
pub use cache::EndpointCache;
pub use overrides::StaticOverrides;
pub use probe::ProbeEngine;
pub use resolver::EndpointResolver;
