//! End-to-end tests driving the bridge over HTTP against a stub remote.

mod helpers;

mod chunked;
mod dispatch;
mod files;
mod probe;
