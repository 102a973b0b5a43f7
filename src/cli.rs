mod ami;
mod instance;
mod template;

pub use ami::AmiArgs;
pub use instance::InstanceArgs;
pub use template::TemplateArgs;

use anyhow::Result;
use aws_config::meta::region::RegionProviderChain;
use aws_config::SdkConfig;
use aws_types::region::Region;
use serde::{Deserialize, Serialize};

use ami_rs::aws::profile_config;

/// Stored defaults; `profile` is used when `--profile` is not passed.
#[derive(Serialize, Deserialize, Default)]
struct Config {
    profile: String,
}

async fn sdk_config(
    profile: Option<String>,
    region: Option<String>,
) -> Result<(SdkConfig, Option<Region>)> {
    let region = match region {
        Some(s) => Some(Region::new(s)),
        None => RegionProviderChain::default_provider().region().await,
    };

    let config: Config = confy::load("ami-rs", Some("aws"))?;
    let profile = profile.or_else(|| (!config.profile.is_empty()).then(|| config.profile.clone()));

    Ok((profile_config(profile.as_deref()).await, region))
}

pub(crate) async fn ec2_client(
    profile: Option<String>,
    region: Option<String>,
) -> Result<aws_sdk_ec2::Client> {
    let (sdk_config, region) = sdk_config(profile, region).await?;
    let config = aws_sdk_ec2::config::Builder::from(&sdk_config)
        .region(region)
        .build();
    Ok(aws_sdk_ec2::Client::from_conf(config))
}

pub(crate) async fn elb_client(
    profile: Option<String>,
    region: Option<String>,
) -> Result<aws_sdk_elasticloadbalancingv2::Client> {
    let (sdk_config, region) = sdk_config(profile, region).await?;
    let config = aws_sdk_elasticloadbalancingv2::config::Builder::from(&sdk_config)
        .region(region)
        .build();
    Ok(aws_sdk_elasticloadbalancingv2::Client::from_conf(config))
}
