#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("winapi call failed: {errno}")]
    Syscall { errno: u32 },
    #[error("hresult call failed: {hresult}")]
    Hresult { hresult: i32 },
    #[error("background thread failed")]
    BackgroundThreadFailure,
}

impl From<u32> for Error {
    fn from(errno: u32) -> Self {
        Error::Syscall { errno }
    }
}

impl Error {
    pub(crate) fn last() -> Self {
        let errno = unsafe { winapi::um::errhandlingapi::GetLastError() };
        tracing::error!(errno = errno, "win32 call failed");
        Error::Syscall { errno }
    }
}

impl From<Error> for crate::error::Error {
    fn from(e: Error) -> Self {
        let io_err = match e {
            Error::Syscall { errno } => std::io::Error::from_raw_os_error(errno as i32),
            Error::Hresult { hresult } => std::io::Error::from_raw_os_error(hresult),
            Error::BackgroundThreadFailure => {
                std::io::Error::new(std::io::ErrorKind::Other, "background wait thread failed")
            }
        };
        crate::error::Error::failure("windows", io_err)
    }
}

/// Helper for checking return values
pub(crate) struct Cvt {
    _priv: (),
}

impl Cvt {
    /// checks that operation returned non-zero
    pub fn nonzero(ret: i32) -> Result<i32, Error> {
        if ret != 0 {
            Ok(ret)
        } else {
            Err(Error::last())
        }
    }

    /// Checks HRESULT is successful
    pub fn hresult(hr: winapi::shared::winerror::HRESULT) -> Result<(), Error> {
        if winapi::shared::winerror::SUCCEEDED(hr) {
            Ok(())
        } else {
            tracing::error!(result = hr, "Unsuccessful HRESULT");
            Err(Error::Hresult { hresult: hr })
        }
    }
}
