pub mod category;
pub mod config;
pub mod error;
pub mod headline;
pub mod message;
pub mod observer;
pub mod poller;
pub mod service;
pub mod settings;
pub mod storage;

pub use category::{Category, CategoryTable, DEFAULT_EMOJI};
pub use config::{CredentialPlacement, ServiceConfig};
pub use error::{CategoryError, DeliveryError, PollError, SettingsError, StoreError};
pub use headline::{Article, CachedState};
pub use message::{Inbound, Outbound};
pub use observer::{ChannelObserver, Observer, ObserverRegistry};
pub use poller::{fetch_headlines, spawn_poller, validate_api_key, KeyValidation, PollerHandle};
pub use service::{PollOutcome, TickerService, Trigger};
pub use settings::{Settings, SettingsUpdate};
pub use storage::LocalStore;
