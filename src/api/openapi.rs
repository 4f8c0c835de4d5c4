#![allow(clippy::needless_for_each)]

use utoipa::OpenApi;

use super::handlers::{admin, embed, health};
use crate::token::{AdminScope, EmbedType};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        admin::login,
        admin::sales_auth,
        admin::preusers_auth,
        admin::main_session,
        admin::sales_session,
        admin::preusers_session,
        admin::main_logout,
        admin::sales_logout,
        admin::preusers_logout,
        embed::generate_token,
        embed::verify_token,
    ),
    components(
        schemas(
            health::Health,
            admin::AdminLoginRequest,
            admin::AdminPasswordRequest,
            admin::AdminLoginResponse,
            admin::AdminSessionResponse,
            embed::EmbedTokenRequest,
            embed::EmbedTokenResponse,
            embed::VerifyTokenRequest,
            embed::VerifyTokenResponse,
            AdminScope,
            EmbedType,
        )
    ),
    tags(
        (name = "health", description = "Liveness and build info"),
        (name = "admin", description = "Scoped admin panel sessions"),
        (name = "embed", description = "Short-lived tokens for premium embeds"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
