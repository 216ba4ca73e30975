//! HTTP entry point for device reports.
//!
//! Routing is a pure content-type decision: a JSON content type selects the
//! structured decoder, anything else the key-value decoder. Hard decode
//! failures surface here and become a bad-request response.

pub mod osmand;

use actix_web::{
    error::ErrorInternalServerError, http::header::CONTENT_TYPE, route, web, HttpRequest,
    HttpResponse,
};
use log::{debug, warn};

use self::osmand::{Decoded, OsmAndDecoder};

#[route("/", method = "GET", method = "POST")]
pub async fn service(
    req: HttpRequest,
    body: web::Bytes,
    decoder: web::Data<OsmAndDecoder>,
) -> actix_web::Result<HttpResponse> {
    let json = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|x| x.to_str().ok())
        .is_some_and(|x| x.starts_with("application/json"));

    let decoded = if json {
        decoder.decode_json(&body).await
    } else {
        decoder.decode_query(req.query_string(), &body).await
    };

    match decoded {
        Ok(Decoded::Accepted { position, response }) => {
            debug!(
                "device {} reported {:.6},{:.6} via {}",
                position.device_id, position.latitude, position.longitude, position.protocol
            );
            decoder
                .record(&position)
                .await
                .map_err(ErrorInternalServerError)?;
            Ok(match response {
                Some(data) => HttpResponse::Ok().body(data),
                None => HttpResponse::Ok().finish(),
            })
        }
        Ok(Decoded::Rejected(status)) => {
            warn!("rejected report: {status}");
            Ok(HttpResponse::new(status))
        }
        Err(error) => {
            warn!("failed to decode report: {error:#}");
            Ok(HttpResponse::BadRequest().finish())
        }
    }
}
