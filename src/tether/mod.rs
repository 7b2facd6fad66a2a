pub mod archival;
pub mod audit;
pub mod cache;
pub mod config;
pub mod conflict;
pub mod debounce;
pub mod document;
pub mod filter;
pub mod lock;
pub mod model;
pub mod paths;
pub mod reconcile;
pub mod storage;
pub mod summary;
pub mod throttle;
pub mod util;
pub mod watcher;
