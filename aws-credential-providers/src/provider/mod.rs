/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Provider traits, futures and errors for AWS identity types.

pub mod credentials;
pub mod token;
