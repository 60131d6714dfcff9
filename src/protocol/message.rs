use serde::{Deserialize, Serialize};

use crate::{Error, Fault, Result};

/// Response payload: the outcome of one remote call.
///
/// `Success` and `Failure` are both results of a call that completed at the
/// transport level; `Failure` carries the application error the remote
/// method returned. `Fault` means the remote side could not run the call or
/// could not encode its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response<R, E> {
    Success(R),
    Failure(E),
    Fault(Fault),
}

impl<R, E> Response<R, E> {
    // ---

    /// Split into the transport outcome and the application outcome.
    pub fn into_result(self) -> Result<std::result::Result<R, E>> {
        // ---
        match self {
            Response::Success(value) => Ok(Ok(value)),
            Response::Failure(err) => Ok(Err(err)),
            Response::Fault(fault) => Err(Error::Fault(fault)),
        }
    }
}

impl<'a, R, E> From<&'a std::result::Result<R, E>> for Response<&'a R, &'a E> {
    fn from(outcome: &'a std::result::Result<R, E>) -> Self {
        // ---
        match outcome {
            Ok(value) => Response::Success(value),
            Err(err) => Response::Failure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_into_result_keeps_application_error_separate() {
        // ---
        let ok: Response<i32, String> = Response::Success(7);
        assert_eq!(ok.into_result().unwrap(), Ok(7));

        let failed: Response<i32, String> = Response::Failure("nope".into());
        assert_eq!(failed.into_result().unwrap(), Err("nope".to_string()));

        let fault: Response<i32, String> = Response::Fault(Fault::Remote("boom".into()));
        assert!(matches!(
            fault.into_result(),
            Err(Error::Fault(Fault::Remote(msg))) if msg == "boom"
        ));
    }
}
