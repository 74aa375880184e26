mod keygen;
mod notify;

pub use keygen::{CommandKeyGenerator, KeyGenError, KeyGenRequest, KeyGenerator, MockKeyGenerator};
pub use notify::{CommandNotifier, NoopNotifier, Notifier, NotifyError, RecordingNotifier};
