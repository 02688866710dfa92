//! Manifest media types and documents.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Media types used in manifest content negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// OCI image index.
    OciIndex,
    /// OCI image manifest.
    OciManifest,
    /// OCI image configuration.
    OciConfig,
    /// OCI gzipped image layer.
    OciLayerGzip,
    /// Docker manifest list (multi-platform).
    DockerManifestList,
    /// Docker image manifest, schema 2.
    DockerManifestV2,
    /// Docker image manifest, schema 1.
    DockerManifestV1,
}

impl MediaType {
    /// Every media type this client understands.
    pub const ALL: [MediaType; 7] = [
        MediaType::OciIndex,
        MediaType::OciManifest,
        MediaType::OciConfig,
        MediaType::OciLayerGzip,
        MediaType::DockerManifestList,
        MediaType::DockerManifestV2,
        MediaType::DockerManifestV1,
    ];

    /// Requested when the caller does not pick: a single-platform image in
    /// either vendor's format.
    pub const DEFAULT_MANIFEST_TYPES: [MediaType; 2] =
        [MediaType::DockerManifestV2, MediaType::OciManifest];

    /// The manifest document types, used when any manifest shape will do.
    pub const MANIFEST_TYPES: [MediaType; 4] = [
        MediaType::DockerManifestList,
        MediaType::OciIndex,
        MediaType::DockerManifestV2,
        MediaType::OciManifest,
    ];

    /// The full MIME string.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::OciIndex => "application/vnd.oci.image.index.v1+json",
            MediaType::OciManifest => "application/vnd.oci.image.manifest.v1+json",
            MediaType::OciConfig => "application/vnd.oci.image.config.v1+json",
            MediaType::OciLayerGzip => "application/vnd.oci.image.layer.v1.tar+gzip",
            MediaType::DockerManifestList => {
                "application/vnd.docker.distribution.manifest.list.v2+json"
            }
            MediaType::DockerManifestV2 => "application/vnd.docker.distribution.manifest.v2+json",
            MediaType::DockerManifestV1 => "application/vnd.docker.distribution.manifest.v1+json",
        }
    }

    /// Look up a media type by its short symbolic name, e.g. `oci_index` or
    /// `docker_manifest_v2`.
    pub fn from_name(name: &str) -> Option<MediaType> {
        match name {
            "oci_index" => Some(MediaType::OciIndex),
            "oci_manifest" => Some(MediaType::OciManifest),
            "oci_config" => Some(MediaType::OciConfig),
            "oci_gzip" => Some(MediaType::OciLayerGzip),
            "docker_manifest_list" => Some(MediaType::DockerManifestList),
            "docker_manifest_v2" => Some(MediaType::DockerManifestV2),
            "docker_manifest_v1" => Some(MediaType::DockerManifestV1),
            _ => None,
        }
    }

    /// Match a `Content-Type` header value, ignoring parameters.
    pub fn from_content_type(value: &str) -> Option<MediaType> {
        let essence = value.split(';').next().unwrap_or(value).trim();
        Self::ALL
            .iter()
            .copied()
            .find(|media| media.as_str() == essence)
    }

    /// Whether this type names a manifest list / index.
    pub fn is_index(&self) -> bool {
        matches!(self, MediaType::OciIndex | MediaType::DockerManifestList)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content descriptor: a reference to a blob or manifest by digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    pub media_type: String,

    /// Content digest, e.g. `sha256:…`.
    pub digest: String,

    /// Size of the content in bytes.
    pub size: u64,

    /// Target platform; present on index entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    /// Arbitrary annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

/// The platform an index entry targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// CPU architecture, e.g. `amd64` or `arm64`.
    pub architecture: String,

    /// Operating system, e.g. `linux`.
    pub os: String,

    /// Operating system version.
    #[serde(
        default,
        rename = "os.version",
        skip_serializing_if = "Option::is_none"
    )]
    pub os_version: Option<String>,

    /// Architecture variant, e.g. `v8`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// A single-platform image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    /// Manifest schema version.
    pub schema_version: u32,

    /// The document's own media type, when it declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// The image configuration blob; absent in legacy schema 1 documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Descriptor>,

    /// The image layers, in application order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<Descriptor>,
}

/// A multi-platform index / manifest list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    /// Manifest schema version.
    pub schema_version: u32,

    /// The document's own media type, when it declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// The per-platform manifests.
    pub manifests: Vec<Descriptor>,
}

/// A fetched manifest document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    /// A single-platform image manifest.
    Image(ImageManifest),

    /// A multi-platform index / manifest list.
    Index(ImageIndex),
}

impl Manifest {
    /// Parse a manifest document according to its negotiated media type.
    pub fn from_slice(media: MediaType, bytes: &[u8]) -> Result<Self, serde_json::Error> {
        if media.is_index() {
            Ok(Manifest::Index(serde_json::from_slice(bytes)?))
        } else {
            Ok(Manifest::Image(serde_json::from_slice(bytes)?))
        }
    }

    /// The document's own `mediaType` field, when present.
    pub fn media_type(&self) -> Option<&str> {
        match self {
            Manifest::Image(manifest) => manifest.media_type.as_deref(),
            Manifest::Index(index) => index.media_type.as_deref(),
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn symbolic_names_map_to_mime_strings() {
        assert_eq!(
            MediaType::from_name("oci_index").unwrap().as_str(),
            "application/vnd.oci.image.index.v1+json"
        );
        assert_eq!(
            MediaType::from_name("docker_manifest_v2").unwrap().as_str(),
            "application/vnd.docker.distribution.manifest.v2+json"
        );
        assert!(MediaType::from_name("tarball").is_none());
    }

    #[test]
    fn content_type_parameters_are_ignored() {
        assert_eq!(
            MediaType::from_content_type("application/vnd.oci.image.index.v1+json; charset=utf-8"),
            Some(MediaType::OciIndex)
        );
        assert_eq!(MediaType::from_content_type("text/html"), None);
    }

    #[test]
    fn parses_an_image_manifest() {
        let document = json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
            "config": {
                "mediaType": "application/vnd.docker.container.image.v1+json",
                "digest": "sha256:0000000000000000000000000000000000000000000000000000000000000000",
                "size": 1469
            },
            "layers": [
                {
                    "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                    "digest": "sha256:1111111111111111111111111111111111111111111111111111111111111111",
                    "size": 2479
                }
            ]
        });

        let manifest =
            Manifest::from_slice(MediaType::DockerManifestV2, &serde_json::to_vec(&document).unwrap())
                .unwrap();
        let Manifest::Image(image) = manifest else {
            panic!("expected an image manifest");
        };
        assert_eq!(image.schema_version, 2);
        assert_eq!(image.layers.len(), 1);
        assert_eq!(image.config.unwrap().size, 1469);
    }

    #[test]
    fn parses_an_index_with_platforms() {
        let document = json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": [
                {
                    "mediaType": "application/vnd.oci.image.manifest.v1+json",
                    "digest": "sha256:2222222222222222222222222222222222222222222222222222222222222222",
                    "size": 7143,
                    "platform": { "architecture": "amd64", "os": "linux" }
                },
                {
                    "mediaType": "application/vnd.oci.image.manifest.v1+json",
                    "digest": "sha256:3333333333333333333333333333333333333333333333333333333333333333",
                    "size": 7143,
                    "platform": { "architecture": "arm64", "os": "linux", "variant": "v8" }
                }
            ]
        });

        let manifest =
            Manifest::from_slice(MediaType::OciIndex, &serde_json::to_vec(&document).unwrap())
                .unwrap();
        let Manifest::Index(index) = manifest else {
            panic!("expected an index");
        };
        assert_eq!(index.manifests.len(), 2);
        let platform = index.manifests[1].platform.as_ref().unwrap();
        assert_eq!(platform.architecture, "arm64");
        assert_eq!(platform.variant.as_deref(), Some("v8"));
    }
}
