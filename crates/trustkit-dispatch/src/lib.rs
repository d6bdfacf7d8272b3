// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// trustkit-dispatch: the command surface a host application calls into.

pub mod codes;
pub mod dispatcher;

pub use codes::{BoundaryError, ErrorCode};
pub use dispatcher::{Dispatcher, MethodCall, MethodResult};
