/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! SSO credentials and token providers
//!
//! Both providers read the token cache written by `aws sso login` under `~/.aws/sso/cache`.
//! [`SsoTokenProvider`] refreshes `sso-session` tokens; [`SsoCredentialsProvider`] exchanges a
//! token for role credentials.

mod cache;
pub mod client;
mod credentials;
mod token;

pub use credentials::{SsoCredentialsProvider, SsoProviderConfig};
pub use token::{Builder as SsoTokenProviderBuilder, SsoTokenProvider};
