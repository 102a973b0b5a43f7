use anyhow::{bail, Context, Result};
use aws_sdk_ec2 as ec2;
use ec2::types::{
    Filter, Image, Instance, LaunchTemplate, LaunchTemplateSpecification, LaunchTemplateVersion,
    RequestLaunchTemplateData, Tag,
};
use ec2::Client;

use crate::retention::ImageRecord;

/// Self-owned images whose `Name` tag contains `filter`, newest first.
pub async fn get_sorted_images(client: &Client, filter: &str) -> Result<Vec<Image>> {
    let resp = client
        .describe_images()
        .filters(
            Filter::builder()
                .name("tag:Name")
                .values(format!("*{filter}*"))
                .build(),
        )
        .owners("self")
        .send()
        .await?;

    let mut images = resp.images().unwrap_or_default().to_vec();
    sort_newest_first(&mut images);
    Ok(images)
}

fn sort_newest_first(images: &mut [Image]) {
    images.sort_by(|a, b| b.creation_date().cmp(&a.creation_date()));
}

/// Flatten SDK images into retention records at the fetch boundary.
///
/// An image missing its id, creation date, `Name` tag, or backing snapshot
/// cannot be evaluated for retention; every such image is reported and the
/// whole operation is refused rather than silently dropping records.
pub fn resolve_image_records(images: &[Image]) -> Result<Vec<ImageRecord>> {
    let mut records = Vec::with_capacity(images.len());
    let mut malformed = Vec::new();
    for image in images {
        match resolve_image_record(image) {
            Ok(record) => records.push(record),
            Err(reason) => {
                let id = image.image_id().unwrap_or("<no image id>");
                malformed.push(format!("{id}: {reason}"));
            }
        }
    }
    if !malformed.is_empty() {
        bail!("malformed images in response: {}", malformed.join("; "));
    }
    Ok(records)
}

fn resolve_image_record(image: &Image) -> Result<ImageRecord, &'static str> {
    let id = image.image_id().ok_or("missing image id")?;
    let creation_date = image.creation_date().ok_or("missing creation date")?;
    let name_tag = name_tag(image.tags()).ok_or("missing \"Name\" tag")?;
    let snapshot_id = image
        .block_device_mappings()
        .into_iter()
        .flatten()
        .find_map(|mapping| mapping.ebs().and_then(|ebs| ebs.snapshot_id()))
        .ok_or("no EBS snapshot in block device mappings")?;

    Ok(ImageRecord {
        id: id.to_string(),
        creation_date: creation_date.to_string(),
        name_tag: name_tag.to_string(),
        snapshot_id: snapshot_id.to_string(),
    })
}

/// The `Name` tag value, if present.
pub fn name_tag(tags: Option<&[Tag]>) -> Option<&str> {
    tags.into_iter()
        .flatten()
        .find(|tag| tag.key() == Some("Name"))
        .and_then(|tag| tag.value())
}

pub async fn deregister_image(client: &Client, image_id: &str) -> Result<()> {
    client
        .deregister_image()
        .image_id(image_id)
        .send()
        .await
        .with_context(|| format!("failed to deregister {image_id}"))?;
    Ok(())
}

pub async fn delete_snapshot(client: &Client, snapshot_id: &str) -> Result<()> {
    client
        .delete_snapshot()
        .snapshot_id(snapshot_id)
        .send()
        .await
        .with_context(|| format!("failed to delete {snapshot_id}"))?;
    Ok(())
}

/// Versions of the named launch template, latest first.
pub async fn get_template_versions(
    client: &Client,
    template_name: &str,
) -> Result<Vec<LaunchTemplateVersion>> {
    let resp = client
        .describe_launch_template_versions()
        .launch_template_name(template_name)
        .send()
        .await
        .with_context(|| {
            format!("no launch template named {template_name}; use the exact template name")
        })?;

    let mut versions = resp.launch_template_versions().unwrap_or_default().to_vec();
    if versions.is_empty() {
        bail!("launch template {template_name} has no versions");
    }
    versions.sort_by_key(|v| std::cmp::Reverse(v.version_number()));
    Ok(versions)
}

pub async fn get_template(client: &Client, template_name: &str) -> Result<LaunchTemplate> {
    let resp = client
        .describe_launch_templates()
        .launch_template_names(template_name)
        .send()
        .await
        .with_context(|| {
            format!("no launch template named {template_name}; use the exact template name")
        })?;

    resp.launch_templates()
        .into_iter()
        .flatten()
        .next()
        .cloned()
        .with_context(|| format!("no launch template named {template_name}"))
}

/// Create a new version on top of `source_version`, changing only the image.
pub async fn create_template_version(
    client: &Client,
    template_id: &str,
    source_version: i64,
    image_id: &str,
) -> Result<LaunchTemplateVersion> {
    let resp = client
        .create_launch_template_version()
        .launch_template_id(template_id)
        .source_version(source_version.to_string())
        .launch_template_data(RequestLaunchTemplateData::builder().image_id(image_id).build())
        .send()
        .await?;

    resp.launch_template_version()
        .cloned()
        .context("create_launch_template_version returned no version")
}

pub async fn set_default_version(client: &Client, template_id: &str, version: i64) -> Result<()> {
    client
        .modify_launch_template()
        .launch_template_id(template_id)
        .default_version(version.to_string())
        .send()
        .await
        .with_context(|| format!("failed to set default version {version} on {template_id}"))?;
    Ok(())
}

pub async fn delete_template_version(
    client: &Client,
    template_id: &str,
    version: i64,
) -> Result<()> {
    let resp = client
        .delete_launch_template_versions()
        .launch_template_id(template_id)
        .versions(version.to_string())
        .send()
        .await?;

    let failed = resp
        .unsuccessfully_deleted_launch_template_versions()
        .unwrap_or_default();
    if !failed.is_empty() {
        bail!("failed to delete version {version} of {template_id}");
    }
    Ok(())
}

/// Instances, optionally restricted to those whose `Name` tag contains
/// `filter`.
pub async fn get_instances(client: &Client, filter: Option<&str>) -> Result<Vec<Instance>> {
    let mut req = client.describe_instances();
    if let Some(filter) = filter {
        req = req.filters(
            Filter::builder()
                .name("tag:Name")
                .values(format!("*{filter}*"))
                .build(),
        );
    }
    let resp = req.send().await?;
    Ok(flatten_reservations(resp.reservations()))
}

pub async fn get_instances_by_id(client: &Client, ids: Vec<String>) -> Result<Vec<Instance>> {
    let resp = client
        .describe_instances()
        .set_instance_ids(Some(ids))
        .send()
        .await?;
    Ok(flatten_reservations(resp.reservations()))
}

fn flatten_reservations(reservations: Option<&[ec2::types::Reservation]>) -> Vec<Instance> {
    reservations
        .into_iter()
        .flatten()
        .flat_map(|res| res.instances().into_iter().flatten())
        .cloned()
        .collect()
}

/// Launch a single instance from a launch template version in a subnet.
pub async fn run_instance_from_template(
    client: &Client,
    template_id: &str,
    version: i64,
    subnet_id: &str,
) -> Result<Vec<Instance>> {
    let resp = client
        .run_instances()
        .launch_template(
            LaunchTemplateSpecification::builder()
                .launch_template_id(template_id)
                .version(version.to_string())
                .build(),
        )
        .min_count(1)
        .max_count(1)
        .subnet_id(subnet_id)
        .send()
        .await?;
    Ok(resp.instances().unwrap_or_default().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ec2::types::{BlockDeviceMapping, EbsBlockDevice};

    fn image(id: &str, date: &str, name: Option<&str>, snapshot: Option<&str>) -> Image {
        let mut builder = Image::builder().image_id(id).creation_date(date);
        if let Some(name) = name {
            builder = builder.tags(Tag::builder().key("Name").value(name).build());
        }
        if let Some(snapshot) = snapshot {
            builder = builder.block_device_mappings(
                BlockDeviceMapping::builder()
                    .ebs(EbsBlockDevice::builder().snapshot_id(snapshot).build())
                    .build(),
            );
        }
        builder.build()
    }

    #[test]
    fn resolves_complete_images() {
        let images = vec![
            image("ami-1", "2024-01-02T00:00:00.000Z", Some("app"), Some("snap-1")),
            image("ami-2", "2024-01-01T00:00:00.000Z", Some("app"), Some("snap-2")),
        ];
        let records = resolve_image_records(&images).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "ami-1");
        assert_eq!(records[0].name_tag, "app");
        assert_eq!(records[1].snapshot_id, "snap-2");
    }

    #[test]
    fn missing_name_tag_is_reported_not_dropped() {
        let images = vec![
            image("ami-1", "2024-01-02T00:00:00.000Z", Some("app"), Some("snap-1")),
            image("ami-2", "2024-01-01T00:00:00.000Z", None, Some("snap-2")),
        ];
        let err = resolve_image_records(&images).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("ami-2"), "{message}");
        assert!(message.contains("Name"), "{message}");
    }

    #[test]
    fn missing_snapshot_is_reported() {
        let images = vec![image("ami-1", "2024-01-01T00:00:00.000Z", Some("app"), None)];
        let err = resolve_image_records(&images).unwrap_err();
        assert!(format!("{err:#}").contains("snapshot"));
    }

    #[test]
    fn sorts_images_newest_first() {
        let mut images = vec![
            image("ami-old", "2023-12-01T00:00:00.000Z", Some("app"), Some("snap-1")),
            image("ami-new", "2024-03-01T00:00:00.000Z", Some("app"), Some("snap-2")),
            image("ami-mid", "2024-01-01T00:00:00.000Z", Some("app"), Some("snap-3")),
        ];
        sort_newest_first(&mut images);
        let ids: Vec<_> = images.iter().filter_map(|i| i.image_id()).collect();
        assert_eq!(ids, ["ami-new", "ami-mid", "ami-old"]);
    }

    #[test]
    fn name_tag_scans_past_other_tags() {
        let tags = [
            Tag::builder().key("Env").value("prod").build(),
            Tag::builder().key("Name").value("web-app").build(),
        ];
        assert_eq!(name_tag(Some(&tags)), Some("web-app"));
        assert_eq!(name_tag(None), None);
    }

    #[tokio::test]
    #[ignore = "needs AWS credentials"]
    async fn test_get_sorted_images() {
        let config = crate::aws::profile_config(None).await;
        let client = Client::new(&config);
        let images = get_sorted_images(&client, "web").await.unwrap();
        eprintln!("{} images", images.len());
    }
}
