pub use http::StatusCode;
use kube::Error;

pub trait HttpStatusCode {
    fn status_code(&self) -> Option<StatusCode>;

    fn is_status_code(&self, status_code: StatusCode) -> bool {
        self.status_code()
            .map(|some| some == status_code)
            .unwrap_or_default()
    }
}

impl HttpStatusCode for kube::Error {
    fn status_code(&self) -> Option<StatusCode> {
        if let Error::Api(error_response) = self {
            StatusCode::from_u16(error_response.code).ok()
        } else {
            None
        }
    }
}

/// Turns the API errors that mean "nothing to do" into `Ok(None)`.
pub trait AllowNotFound<T> {
    /// A `404` means the object is already gone.
    fn allow_not_found(self) -> std::result::Result<Option<T>, kube::Error>;

    /// A `409` means the object was already created.
    fn allow_already_exists(self) -> std::result::Result<Option<T>, kube::Error>;
}

impl<T> AllowNotFound<T> for std::result::Result<T, kube::Error> {
    fn allow_not_found(self) -> std::result::Result<Option<T>, kube::Error> {
        allow_status(self, StatusCode::NOT_FOUND)
    }

    fn allow_already_exists(self) -> std::result::Result<Option<T>, kube::Error> {
        allow_status(self, StatusCode::CONFLICT)
    }
}

fn allow_status<T>(
    result: std::result::Result<T, kube::Error>,
    status_code: StatusCode,
) -> std::result::Result<Option<T>, kube::Error> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_status_code(status_code) => Ok(None),
        Err(e) => Err(e),
    }
}
