// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![deny(missing_debug_implementations, rust_2018_idioms, unused_imports)]
#![doc(test(attr(deny(warnings))))]

//! rask is a single-threaded reactor HTTP/1.1 server: one `mio`-driven event
//! loop dispatches accept/read/write readiness, handing parsing and response
//! assembly off to a small worker pool while idle connections are reclaimed
//! by an indexed timer heap.
//!
//! The [`reactor`] module ties everything together; [`connection`] and
//! [`http`] hold the per-connection state machine and wire format; [`timer`],
//! [`worker_pool`], and [`pool`] are the concurrency primitives the reactor is
//! built from.

pub mod auth;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod logging;
pub mod mime;
pub mod pool;
pub mod reactor;
pub mod timer;
pub mod worker_pool;
