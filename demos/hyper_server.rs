use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use form_uploader::{rules, FieldValue, Outcome, UploadOption, UploadOptions, Uploader, ValidationRules};
use futures_util::StreamExt;
use http_body_util::{BodyStream, Full};
use hyper::{body::Incoming, Request, Response, StatusCode};

// A handler for incoming requests.
async fn handle(uploader: Arc<Uploader>, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    // Convert the body into a stream of data frames.
    let req = req.map(|body| {
        BodyStream::new(body).filter_map(|result| async move { result.map(|frame| frame.into_data().ok()).transpose() })
    });

    match uploader.process_request(req).await {
        Outcome::Continue(accepted) => {
            for (name, value) in &accepted.body {
                match value {
                    FieldValue::Single(value) => println!("{}: {}", name, value),
                    FieldValue::Multiple(values) => println!("{}: {:?}", name, values),
                }
            }

            Ok(Response::new(Full::from("Success")))
        }
        Outcome::Reject(rejection) => {
            if let Some(cause) = &rejection.cause {
                eprintln!("upload failed: {}", cause);
            }

            match rejection.to_response() {
                Ok(res) => Ok(res.map(Full::new)),
                Err(err) => {
                    let mut res = Response::new(Full::from(format!("INTERNAL SERVER ERROR: {}", err)));
                    *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                    Ok(res)
                }
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let uploader = Arc::new(Uploader::new(
        ValidationRules::new().rule(rules::required("name")),
        UploadOptions::new()
            .field(
                "avatar",
                UploadOption::new("uploads/avatars")
                    .allowed_types(["image/png", "image/jpeg"])
                    .max_size(2 * 1024 * 1024),
            )
            .field(
                "gallery",
                UploadOption::new("uploads/gallery")
                    .multiple(true)
                    .max_files(5)
                    .allowed_mime(&mime::IMAGE_PNG),
            ),
    ));

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    println!(
        "Server running at: {} ({} upload fields, {} rules)",
        addr,
        uploader.options().len(),
        uploader.rules().len()
    );

    loop {
        let (socket, _remote_addr) = listener.accept().await.unwrap();
        let socket = hyper_util::rt::TokioIo::new(socket);
        let uploader = Arc::clone(&uploader);

        tokio::spawn(async move {
            let service = hyper::service::service_fn(move |req| handle(Arc::clone(&uploader), req));

            if let Err(e) = hyper::server::conn::http1::Builder::new()
                .serve_connection(socket, service)
                .await
            {
                eprintln!("server error: {}", e);
            }
        });
    }
}
