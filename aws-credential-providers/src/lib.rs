/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

#![warn(
    missing_debug_implementations,
    missing_docs,
    rustdoc::missing_crate_level_docs,
    rust_2018_idioms
)]

//! `aws-credential-providers` resolves AWS credentials and SSO bearer tokens.
//!
//! Leaf providers each read one source: environment variables, system properties, shared config
//! profiles, an external process, the ECS container metadata service, EC2 instance metadata,
//! STS web identity federation or an SSO session. [`meta`] combines them into chains and caches,
//! and [`default_provider`] assembles the chain most applications want.
//!
//! # Examples
//!
//! Load credentials from the default chain:
//! ```no_run
//! use aws_credential_providers::provider::credentials::ProvideCredentials;
//! # async fn docs() {
//! let provider = aws_credential_providers::default_provider::default_provider();
//! let credentials = provider.provide_credentials().await;
//! # }
//! ```
//!
//! Every provider takes its environment, filesystem, clock and HTTP connector from a
//! [`ProviderConfig`](provider_config::ProviderConfig), so each can be exercised without real IO.

pub mod connector;
pub mod credential_process;
pub mod default_provider;
pub mod ecs;
pub mod environment;
pub mod imds;
pub mod meta;
pub mod os_shim;
pub mod profile;
pub mod provider;
pub mod provider_config;
/// AWS regions
pub mod region;
pub mod retry;
pub mod sso;
pub mod sts;
pub mod system_properties;
pub mod web_identity_token;

mod command;
mod credentials;
mod fs_util;
mod json_credentials;
mod timeout;
mod token;

#[cfg(test)]
mod time_source;

pub use credentials::{AccountId, Credentials, CredentialsBuilder};
pub use token::AccessToken;
