/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Providers that augment other providers

/// Credential Providers
pub mod credentials;

pub(crate) mod cache;
