//! Infrastructure layer: adapters for the collaborators the auth core only
//! knows through interfaces, plus the background sweep worker.

pub mod credentials;
pub mod policies;
pub mod seed;
pub mod workers;

pub use credentials::{
    CredentialDirectory, DecoyHash, DirectoryError, InMemoryCredentialDirectory, UserRecord,
};
pub use policies::{InMemoryPolicyDirectory, PolicyDirectory, PolicyRecord, PolicyStatus};
pub use seed::{SeedData, SeedError};
pub use workers::sweeper::{Sweeper, SweeperHandle};
