/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Default provider chains
//!
//! [`credentials::default_provider`] builds the credentials chain most applications want.

/// Default credentials provider chain
pub mod credentials;
pub use credentials::{default_provider, DefaultCredentialsChain};
