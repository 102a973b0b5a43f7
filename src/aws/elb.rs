use anyhow::{bail, Context, Result};
use aws_sdk_elasticloadbalancingv2 as elbv2;
use elbv2::types::TargetHealthStateEnum;
use elbv2::Client;

/// Instance ids of the healthy targets in the named target group.
///
/// The group is looked up by its exact name; a missing group gets its own
/// diagnostic since a typo here is the common operator mistake.
pub async fn healthy_target_ids(client: &Client, target_group: &str) -> Result<Vec<String>> {
    let groups = match client
        .describe_target_groups()
        .names(target_group)
        .send()
        .await
    {
        Ok(resp) => resp.target_groups().unwrap_or_default().to_vec(),
        Err(err) => {
            let err = err.into_service_error();
            if err.is_target_group_not_found_exception() {
                bail!("no target group named {target_group}; use the exact target group name");
            }
            return Err(err.into());
        }
    };

    let arn = groups
        .first()
        .and_then(|group| group.target_group_arn())
        .with_context(|| format!("no target group named {target_group}"))?;

    let health = client
        .describe_target_health()
        .target_group_arn(arn)
        .send()
        .await?;

    Ok(health
        .target_health_descriptions()
        .into_iter()
        .flatten()
        .filter(|desc| {
            desc.target_health().and_then(|h| h.state()) == Some(&TargetHealthStateEnum::Healthy)
        })
        .filter_map(|desc| desc.target().and_then(|t| t.id()).map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "needs AWS credentials and a target group"]
    async fn test_healthy_target_ids() {
        let config = crate::aws::profile_config(None).await;
        let client = Client::new(&config);
        let ids = healthy_target_ids(&client, "web-app").await.unwrap();
        eprintln!("{ids:?}");
    }
}
