use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CastGuard Configuration API",
        version = "0.1.0",
        description = "API REST pour consulter et modifier la configuration de CastGuard",
    ),
    paths(
        crate::api::get_full_config,
        crate::api::get_config_value,
        crate::api::update_config_value,
    ),
    components(
        schemas(
            crate::api::ConfigValue,
            crate::api::UpdateConfigRequest,
            crate::api::UpdateConfigResponse,
        )
    ),
    tags(
        (name = "config", description = "Gestion de la configuration")
    )
)]
pub struct ApiDoc;
