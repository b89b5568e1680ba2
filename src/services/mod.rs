// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod ai;
pub mod calendar;
pub mod gmail;
pub mod google_oidc;
pub mod kms;
pub mod tasks;
pub mod tts;
pub mod visitor;

pub use ai::AiService;
pub use calendar::CalendarService;
pub use gmail::{GmailService, OAuthResult};
pub use google_oidc::{GoogleOidcVerifier, OidcError, VerifiedTaskPrincipal};
pub use kms::KmsService;
pub use tasks::TasksService;
pub use tts::TtsService;
pub use visitor::{TtlCache, VisitorIdCache};
