use aws_config::SdkConfig;

pub mod ec2;
pub mod elb;

/// Load SDK configuration for a named profile, or the default provider
/// chain when none is given. Clients are built from this once per
/// invocation and threaded explicitly; there is no ambient session.
pub async fn profile_config(profile: Option<&str>) -> SdkConfig {
    match profile {
        Some(name) => aws_config::from_env().profile_name(name).load().await,
        None => aws_config::load_from_env().await,
    }
}
