#![no_main]

use std::convert::Infallible;

use form_uploader::bytes::Bytes;
use form_uploader::{Outcome, UploadOption, UploadOptions, Uploader, ValidationRules};
use futures_util::stream::once;
use libfuzzer_sys::fuzz_target;
use tokio::runtime;

fuzz_target!(|data: &[u8]| {
    let data = data.to_vec();
    let stream = once(async move { Result::<Bytes, Infallible>::Ok(Bytes::from(data)) });

    let uploader = Uploader::new(
        ValidationRules::new(),
        UploadOptions::new().field(
            "file",
            UploadOption::new(std::env::temp_dir().join("form-uploader-fuzz"))
                .multiple(true)
                .max_files(4)
                .allowed_type("text/txt")
                .max_size(64),
        ),
    );

    let rt = runtime::Builder::new_current_thread().enable_time().build().expect("runtime");
    rt.block_on(async {
        match uploader.process(stream, "X-BOUNDARY").await {
            Outcome::Continue(accepted) => assert!(accepted.files.len() <= 4),
            Outcome::Reject(rejection) => assert!(!rejection.report.is_empty()),
        }
    })
});
