use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use form_uploader::{
    rules, FieldValue, Outcome, UploadOption, UploadOptions, Uploader, ValidationRules, Violation,
};
use futures_util::stream::{self, Stream, StreamExt};
use http::StatusCode;

const BOUNDARY: &str = "X-BOUNDARY";

enum Part<'a> {
    Field(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut data = Vec::new();

    for part in parts {
        data.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Field(name, value) => {
                data.extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes());
                data.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, content) => {
                data.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                data.extend_from_slice(content);
            }
        }
        data.extend_from_slice(b"\r\n");
    }

    data.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    data
}

fn byte_stream(data: Vec<u8>) -> impl Stream<Item = form_uploader::Result<Bytes>> + Send + 'static {
    stream::iter(
        data.into_iter()
            .map(|byte| form_uploader::Result::Ok(Bytes::copy_from_slice(&[byte]))),
    )
}

fn avatar_uploader(dir: &Path, rules: ValidationRules) -> Uploader {
    Uploader::new(
        rules,
        UploadOptions::new()
            .field(
                "avatar",
                UploadOption::new(dir)
                    .allowed_types(["image/png", "image/jpeg"])
                    .max_size(1024),
            )
            .field(
                "photos",
                UploadOption::new(dir.join("photos"))
                    .multiple(true)
                    .max_files(2)
                    .allowed_type("image/png"),
            ),
    )
}

fn saved_names(dir: &Path) -> Vec<String> {
    let mut names = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn test_upload_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let uploader = avatar_uploader(tmp.path(), ValidationRules::new().rule(rules::required("name")));

    let data = multipart_body(&[
        Part::Field("name", "John"),
        Part::File("avatar", "me.png", b"\x89PNG\r\n\x1a\n"),
    ]);

    let accepted = uploader.process(byte_stream(data), BOUNDARY).await.accepted().unwrap();

    let saved = accepted.body.get("avatar").unwrap().as_single().unwrap();
    let (prefix, original) = saved.split_once('_').unwrap();
    assert!(prefix.parse::<u64>().is_ok());
    assert_eq!(original, "me.png");
    assert_eq!(std::fs::read(tmp.path().join(saved)).unwrap(), b"\x89PNG\r\n\x1a\n");
    assert_eq!(accepted.body.get("name"), Some(&FieldValue::Single("John".to_owned())));
    assert_eq!(accepted.files[0].path, tmp.path().join(saved));
}

#[tokio::test]
async fn test_second_file_for_single_field() {
    let tmp = tempfile::tempdir().unwrap();
    let uploader = avatar_uploader(tmp.path(), ValidationRules::new());

    let data = multipart_body(&[
        Part::File("avatar", "a.png", b"one"),
        Part::File("avatar", "b.png", b"two"),
    ]);

    let rejection = uploader.process(byte_stream(data), BOUNDARY).await.rejection().unwrap();

    assert_eq!(rejection.status, StatusCode::BAD_REQUEST);
    assert_eq!(rejection.report.len(), 1);
    assert_eq!(rejection.report.count_violations(Violation::MaxFiles), 1);
    assert_eq!(rejection.report.errors[0].value, Some(serde_json::json!("b.png")));
    assert!(saved_names(tmp.path()).is_empty());
}

#[tokio::test]
async fn test_size_limit_boundary() {
    let tmp = tempfile::tempdir().unwrap();
    let uploader = avatar_uploader(tmp.path(), ValidationRules::new());

    let exact = vec![7u8; 1024];
    let data = multipart_body(&[Part::File("avatar", "exact.png", &exact)]);
    let accepted = uploader.process(byte_stream(data), BOUNDARY).await.accepted().unwrap();
    assert_eq!(std::fs::read(&accepted.files[0].path).unwrap().len(), 1024);

    let over = vec![7u8; 1025];
    let data = multipart_body(&[Part::File("avatar", "over.png", &over)]);
    let rejection = uploader.process(byte_stream(data), BOUNDARY).await.rejection().unwrap();

    assert_eq!(rejection.status, StatusCode::BAD_REQUEST);
    assert_eq!(rejection.report.len(), 1);
    assert_eq!(rejection.report.count_violations(Violation::SizeExceeded), 1);
    assert_eq!(
        rejection.report.errors[0].message,
        "File size exceeds the limit for avatar. Max size: 0.0009765625 MB"
    );
    assert_eq!(saved_names(tmp.path()).len(), 1);
}

#[tokio::test]
async fn test_allowed_types() {
    let tmp = tempfile::tempdir().unwrap();
    let uploader = avatar_uploader(tmp.path(), ValidationRules::new());

    let data = multipart_body(&[Part::File("avatar", "x.gif", b"GIF89a")]);
    let rejection = uploader.process(byte_stream(data), BOUNDARY).await.rejection().unwrap();
    assert_eq!(rejection.report.count_violations(Violation::InvalidType), 1);
    assert_eq!(
        rejection.report.errors[0].message,
        "Invalid file type for avatar. Allowed types: image/png, image/jpeg"
    );

    let data = multipart_body(&[Part::File("avatar", "x.PNG", b"PNG")]);
    let accepted = uploader.process(byte_stream(data), BOUNDARY).await.accepted().unwrap();
    assert!(accepted.body.get("avatar").unwrap().as_single().unwrap().ends_with("_x.PNG"));
}

#[tokio::test]
async fn test_every_error_in_one_response() {
    let tmp = tempfile::tempdir().unwrap();
    let uploader = avatar_uploader(tmp.path(), ValidationRules::new().rule(rules::required("name")));

    let big = vec![0u8; 2048];
    let data = multipart_body(&[
        Part::File("avatar", "big.png", &big),
        Part::File("photos", "1.png", &big[..10]),
        Part::File("photos", "2.png", &big[..10]),
        Part::File("photos", "3.png", &big[..10]),
    ]);

    let outcome = uploader.process(byte_stream(data), BOUNDARY).await;
    let rejection = match outcome {
        Outcome::Reject(rejection) => rejection,
        Outcome::Continue(accepted) => panic!("unexpected acceptance: {:?}", accepted.body),
    };

    assert_eq!(rejection.status, StatusCode::BAD_REQUEST);
    assert_eq!(rejection.report.len(), 3);
    assert_eq!(rejection.report.errors[0].path, "name");
    assert_eq!(rejection.report.count_violations(Violation::SizeExceeded), 1);
    assert_eq!(rejection.report.count_violations(Violation::MaxFiles), 1);
    assert!(saved_names(tmp.path()).is_empty());
    assert!(saved_names(&tmp.path().join("photos")).is_empty());

    let res = rejection.to_response().unwrap();
    let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["errors"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_multiple_files_and_values() {
    let tmp = tempfile::tempdir().unwrap();
    let uploader = Uploader::new(
        ValidationRules::new(),
        UploadOptions::new()
            .field(
                "photos",
                UploadOption::new(tmp.path().join("photos"))
                    .multiple(true)
                    .allowed_type("image/png"),
            )
            .field("tags", UploadOption::new(tmp.path()).multiple(true)),
    );

    let data = multipart_body(&[
        Part::Field("tags", "sea"),
        Part::File("photos", "1.png", b"first"),
        Part::Field("tags", "sun"),
        Part::File("photos", "2.png", b"second"),
        Part::Field("title", "old"),
        Part::Field("title", "Holiday"),
    ]);

    let accepted = uploader.process(byte_stream(data), BOUNDARY).await.accepted().unwrap();

    let photos = accepted.body.get("photos").unwrap().values();
    assert_eq!(photos.len(), 2);
    assert!(photos[0].ends_with("_1.png"));
    assert!(photos[1].ends_with("_2.png"));
    assert_eq!(
        accepted.body.get("tags"),
        Some(&FieldValue::Multiple(vec!["sea".to_owned(), "sun".to_owned()]))
    );
    assert_eq!(accepted.body.get("title"), Some(&FieldValue::Single("Holiday".to_owned())));
    assert_eq!(saved_names(&tmp.path().join("photos")).len(), 2);
}

#[tokio::test]
async fn test_unconfigured_file_is_ignored() {
    let tmp = tempfile::tempdir().unwrap();
    let uploader = avatar_uploader(tmp.path(), ValidationRules::new());

    let data = multipart_body(&[
        Part::File("resume", "cv.pdf", b"%PDF"),
        Part::Field("name", "John"),
    ]);

    let accepted = uploader.process(byte_stream(data), BOUNDARY).await.accepted().unwrap();
    assert!(accepted.body.get("resume").is_none());
    assert!(accepted.files.is_empty());
    assert!(saved_names(tmp.path()).is_empty());
}

#[tokio::test]
async fn test_creates_missing_upload_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("nested").join("uploads");
    let uploader = avatar_uploader(&dir, ValidationRules::new());

    let data = multipart_body(&[
        Part::File("photos", "1.png", b"a"),
        Part::File("photos", "2.png", b"b"),
    ]);

    assert!(uploader.process(byte_stream(data), BOUNDARY).await.is_continue());
    assert_eq!(saved_names(&dir.join("photos")).len(), 2);
}

#[tokio::test]
async fn test_custom_error_messages() {
    let tmp = tempfile::tempdir().unwrap();
    let uploader = Uploader::new(
        ValidationRules::new(),
        UploadOptions::from_json(&format!(
            r#"{{ "doc": {{
                "allowedTypes": ["application/pdf"],
                "maxSize": 4,
                "uploadDir": {:?},
                "errorMessage": {{ "sizeExceeded": "Max {{max_size_mb}} MB", "maxFiles": "One document only" }}
            }} }}"#,
            tmp.path().to_string_lossy()
        ))
        .unwrap(),
    );

    let data = multipart_body(&[
        Part::File("doc", "a.pdf", b"too large"),
        Part::File("doc", "b.pdf", b"ok"),
    ]);
    let rejection = uploader.process(byte_stream(data), BOUNDARY).await.rejection().unwrap();

    let messages = rejection
        .report
        .errors
        .iter()
        .map(|err| err.message.as_str())
        .collect::<Vec<_>>();
    assert_eq!(messages, ["Max 0.000003814697265625 MB", "One document only"]);
}

#[tokio::test]
async fn test_broken_stream() {
    let tmp = tempfile::tempdir().unwrap();
    let uploader = avatar_uploader(tmp.path(), ValidationRules::new());

    let mut data = multipart_body(&[Part::File("avatar", "a.png", b"abcdef")]);
    data.truncate(data.len() - 20);

    let stream = byte_stream(data).chain(stream::once(async {
        Err(form_uploader::Error::StreamReadFailed(multer::Error::IncompleteStream))
    }));
    let rejection = uploader.process(stream, BOUNDARY).await.rejection().unwrap();

    assert_eq!(rejection.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(rejection.report.len(), 1);
    assert_eq!(rejection.report.errors[0].kind.as_str(), "form");
    assert!(rejection.cause.is_some());
    assert!(saved_names(tmp.path()).is_empty());
}

#[tokio::test]
async fn test_stalled_stream_times_out() {
    let tmp = tempfile::tempdir().unwrap();
    let uploader = avatar_uploader(tmp.path(), ValidationRules::new()).timeout(Duration::from_millis(50));

    let mut data = multipart_body(&[Part::File("avatar", "a.png", b"abcdef")]);
    data.truncate(data.len() - 20);

    let stream = byte_stream(data).chain(stream::pending());
    let rejection = uploader.process(stream, BOUNDARY).await.rejection().unwrap();

    assert_eq!(rejection.status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(
        rejection.report.errors[0].message,
        "Timed out receiving the multipart stream after 50 ms"
    );
}

#[tokio::test]
async fn test_process_request() {
    let tmp = tempfile::tempdir().unwrap();
    let uploader = avatar_uploader(tmp.path(), ValidationRules::new());

    let data = multipart_body(&[Part::File("avatar", "a.jpeg", b"jpeg")]);
    let req = http::Request::builder()
        .header(http::header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(byte_stream(data))
        .unwrap();
    assert!(uploader.process_request(req).await.is_continue());

    let req = http::Request::builder()
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(byte_stream(b"{}".to_vec()))
        .unwrap();
    let rejection = uploader.process_request(req).await.rejection().unwrap();

    assert_eq!(rejection.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(rejection.cause, Some(form_uploader::Error::NoMultipart));
    assert_eq!(
        rejection.report.errors[0].message,
        "Content-Type is not multipart/form-data"
    );
}

#[cfg(feature = "tokio-io")]
#[tokio::test]
async fn test_process_reader() {
    let tmp = tempfile::tempdir().unwrap();
    let uploader = avatar_uploader(tmp.path(), ValidationRules::new());

    let data = multipart_body(&[Part::File("avatar", "a.png", b"png")]);
    let outcome = uploader.process_reader(std::io::Cursor::new(data), BOUNDARY).await;

    assert!(outcome.is_continue());
}
