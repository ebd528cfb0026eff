pub mod account;
pub mod attempt;

pub use account::SqliteAccountRepository;
pub use attempt::SqliteAttemptStore;
