//! Reader behavior on corrupt, tampered, and malformed bundles.

use carton::{
    BundleError, ContentsError, DigestError, ReadableBundle, SignatureError, CONTENTS_JSON,
    CONTENTS_SIG,
};
use carton_testkit::bundles::{
    contents_json, descriptor, envelope_json, handmade_bundle, RawBundleBuilder,
};

fn open(buffer: Vec<u8>) -> ReadableBundle<serde_json::Value> {
    ReadableBundle::new(std::io::Cursor::new(buffer), "test@1", None)
}

fn valid_headers() -> (Vec<u8>, Vec<u8>) {
    let contents = contents_json("test@1", serde_json::json!(["m"]), vec![]);
    let envelope = envelope_json(&contents, None);
    (contents, envelope)
}

#[tokio::test]
async fn corrupted_resource_fails_its_digest_check() {
    let bundle = handmade_bundle(
        "test@1",
        serde_json::json!(["m"]),
        &[(descriptor("hello", b"hello"), b"jello")],
    );

    let mut reading = open(bundle);
    reading.manifest().await.unwrap();
    let mut resources = reading.resources().unwrap();
    let resource = resources.next().await.unwrap().unwrap();

    let err = resource.data.read_to_vec().await.unwrap_err();
    match err {
        BundleError::Digest(DigestError::Mismatch { expected, actual }) => {
            assert_eq!(expected, descriptor("hello", b"hello").digest.to_string());
            assert_eq!(actual, descriptor("hello", b"jello").digest.to_string());
        }
        other => panic!("expected digest mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn tampered_contents_fails_the_envelope_digest() {
    let (contents, envelope) = valid_headers();
    let mut tampered = contents.clone();
    // Flip one byte inside the JSON body.
    tampered[10] ^= 0x01;

    let bundle = RawBundleBuilder::new()
        .entry(CONTENTS_JSON, &tampered)
        .entry(CONTENTS_SIG, &envelope)
        .build();

    let err = open(bundle).manifest().await.unwrap_err();
    assert!(matches!(err, BundleError::ContentsCorrupted));
}

#[tokio::test]
async fn malformed_envelope_is_rejected() {
    let (contents, _) = valid_headers();
    let bundle = RawBundleBuilder::new()
        .entry(CONTENTS_JSON, &contents)
        .entry(CONTENTS_SIG, b"not json at all")
        .build();

    let err = open(bundle).manifest().await.unwrap_err();
    assert!(matches!(
        err,
        BundleError::Signature(SignatureError::MalformedEnvelope(_))
    ));
}

#[tokio::test]
async fn unparseable_contents_is_malformed() {
    let contents = b"{ definitely not json".to_vec();
    let envelope = envelope_json(&contents, None);
    let bundle = RawBundleBuilder::new()
        .entry(CONTENTS_JSON, &contents)
        .entry(CONTENTS_SIG, &envelope)
        .build();

    let err = open(bundle).manifest().await.unwrap_err();
    assert!(matches!(
        err,
        BundleError::Contents(ContentsError::Malformed(_))
    ));
}

#[tokio::test]
async fn unsupported_version_is_fatal() {
    let contents = serde_json::to_vec_pretty(&serde_json::json!({
        "version": "2",
        "type": "test@1",
        "manifest": ["m"],
        "resources": [],
    }))
    .unwrap();
    let envelope = envelope_json(&contents, None);
    let bundle = RawBundleBuilder::new()
        .entry(CONTENTS_JSON, &contents)
        .entry(CONTENTS_SIG, &envelope)
        .build();

    let err = open(bundle).manifest().await.unwrap_err();
    assert!(matches!(
        err,
        BundleError::Contents(ContentsError::UnsupportedVersion { found, .. }) if found == "2"
    ));
}

#[tokio::test]
async fn missing_top_level_field_is_named() {
    let contents = serde_json::to_vec_pretty(&serde_json::json!({
        "version": "1",
        "type": "test@1",
        "resources": [],
    }))
    .unwrap();
    let envelope = envelope_json(&contents, None);
    let bundle = RawBundleBuilder::new()
        .entry(CONTENTS_JSON, &contents)
        .entry(CONTENTS_SIG, &envelope)
        .build();

    let err = open(bundle).manifest().await.unwrap_err();
    assert!(matches!(
        err,
        BundleError::Contents(ContentsError::MissingField("manifest"))
    ));
}

#[tokio::test]
async fn missing_descriptor_field_is_named_with_its_index() {
    let contents = serde_json::to_vec_pretty(&serde_json::json!({
        "version": "1",
        "type": "test@1",
        "manifest": ["m"],
        "resources": [
            { "id": "ok", "size": 1, "digest": descriptor("ok", b"x").digest.to_string() },
            { "id": "broken", "size": 1 },
        ],
    }))
    .unwrap();
    let envelope = envelope_json(&contents, None);
    let bundle = RawBundleBuilder::new()
        .entry(CONTENTS_JSON, &contents)
        .entry(CONTENTS_SIG, &envelope)
        .build();

    let err = open(bundle).manifest().await.unwrap_err();
    assert!(matches!(
        err,
        BundleError::Contents(ContentsError::MissingResourceField {
            index: 1,
            field: "digest"
        })
    ));
}

#[tokio::test]
async fn entry_outside_resources_dir_is_unexpected() {
    let payload = b"hello";
    let contents = contents_json(
        "test@1",
        serde_json::json!(["m"]),
        vec![descriptor("hello", payload)],
    );
    let envelope = envelope_json(&contents, None);
    let bundle = RawBundleBuilder::new()
        .entry(CONTENTS_JSON, &contents)
        .entry(CONTENTS_SIG, &envelope)
        .entry("stray-file", payload)
        .build();

    let mut reading = open(bundle);
    reading.manifest().await.unwrap();
    let mut resources = reading.resources().unwrap();

    let err = resources.next().await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        BundleError::UnexpectedEntry { found, .. } if found == "stray-file"
    ));
}

#[tokio::test]
async fn undeclared_resource_entry_is_unknown() {
    let contents = contents_json(
        "test@1",
        serde_json::json!(["m"]),
        vec![descriptor("hello", b"hello")],
    );
    let envelope = envelope_json(&contents, None);
    let stray = descriptor("stray", b"undeclared payload");
    let bundle = RawBundleBuilder::new()
        .entry(CONTENTS_JSON, &contents)
        .entry(CONTENTS_SIG, &envelope)
        .entry(
            &format!("resources/{}", stray.digest.hex()),
            b"undeclared payload",
        )
        .build();

    let mut reading = open(bundle);
    reading.manifest().await.unwrap();
    let mut resources = reading.resources().unwrap();

    let err = resources.next().await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        BundleError::UnknownResource(name) if name.ends_with(stray.digest.hex())
    ));
}

#[tokio::test]
async fn duplicate_ids_in_document_are_rejected() {
    // Assembled by hand: the writer-side encoder refuses duplicates.
    let entry = serde_json::json!({
        "id": "twin",
        "size": 5,
        "digest": descriptor("twin", b"hello").digest.to_string(),
    });
    let contents = serde_json::to_vec_pretty(&serde_json::json!({
        "version": "1",
        "type": "test@1",
        "manifest": ["m"],
        "resources": [entry.clone(), entry],
    }))
    .unwrap();

    let envelope = envelope_json(&contents, None);
    let bundle = RawBundleBuilder::new()
        .entry(CONTENTS_JSON, &contents)
        .entry(CONTENTS_SIG, &envelope)
        .build();

    let err = open(bundle).manifest().await.unwrap_err();
    assert!(matches!(
        err,
        BundleError::Contents(ContentsError::DuplicateResourceId(id)) if id == "twin"
    ));
}

#[tokio::test]
async fn truncated_resource_body_is_an_archive_error() {
    let payload = vec![3u8; 4096];
    let mut bundle = handmade_bundle(
        "test@1",
        serde_json::json!(["m"]),
        &[(descriptor("big", &payload), payload.as_slice())],
    );
    // Cut into the resource body, past the two header entries.
    bundle.truncate(bundle.len() - 2048);

    let mut reading = open(bundle);
    reading.manifest().await.unwrap();
    let mut resources = reading.resources().unwrap();
    let resource = resources.next().await.unwrap().unwrap();

    let err = resource.data.read_to_vec().await.unwrap_err();
    assert!(matches!(err, BundleError::Archive(_)));
}
