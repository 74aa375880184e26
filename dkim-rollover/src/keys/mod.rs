mod changes;
mod context;
mod key;
mod key_config_set;
mod key_types;
mod lifecycle;
mod month;

pub use changes::{Change, ChangeAction, ChangeLog};
pub use context::KeyContext;
pub use key::{record_path_for, Key, KeyError, KeyName, ValidationOutcome};
pub use key_config_set::{KeyConfigSet, KeyConfigSetError};
pub use key_types::{KeyTypeDefinition, KeyTypeError, KeyTypeRegistry};
pub use lifecycle::{Category, LifecycleState, LifetimeTooLong, Lifetimes, MAX_LIFETIME_MONTHS};
pub use month::{InvalidMonth, MonthIndex};
