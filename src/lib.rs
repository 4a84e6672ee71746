// Botminter - bot account provisioning for monitored feeds
// This exposes the pipeline and its collaborator contracts for embedding

pub mod config;
pub mod platform;
pub mod profile;
pub mod publisher;
pub mod registerer;
pub mod store;
pub mod telemetry;

// Re-export key types for easy access
pub use config::BotminterConfig;
pub use platform::{
    AccessToken, AdminAccountView, NewAccount, NewStatus, OriginStatus, PinnedStatus,
    PlatformClient, PlatformError, SetupTargets, Visibility,
};
pub use profile::{FetchError, ProfileInfo, ProfileResolver};
pub use publisher::{ConfigPublisher, FeedEntry, PublishError};
pub use registerer::{AccountRegisterer, RegisterError, RegistererSettings};
pub use store::{
    MemoryRegistrationStore, RegistrationRecord, RegistrationState, RegistrationStore, RequestKey,
    SqliteRegistrationStore, StoreError,
};
pub use telemetry::init_telemetry;
