use std::fmt;
use std::io::Error;
use std::str::FromStr;

/// Environment variable name containing the environment identifier.
const APP_ENVIRONMENT_ENV_NAME: &str = "APP_ENVIRONMENT";

/// Production environment identifier.
const PROD_ENV_NAME: &str = "prod";

/// Staging environment identifier.
const STAGING_ENV_NAME: &str = "staging";

/// Development environment identifier.
const DEV_ENV_NAME: &str = "dev";

/// Runtime environment of a pipeline process.
///
/// Selects the environment-specific configuration file and the log output
/// format (pretty console output in development, JSON files otherwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Prod,
    Staging,
    Dev,
}

impl Environment {
    /// Loads the environment from the `APP_ENVIRONMENT` environment variable.
    ///
    /// Defaults to [`Environment::Prod`] if the variable is not set.
    pub fn load() -> Result<Environment, Error> {
        match std::env::var(APP_ENVIRONMENT_ENV_NAME) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Environment::Prod),
        }
    }

    /// Sets the `APP_ENVIRONMENT` environment variable to this environment's value.
    pub fn set(&self) {
        // SAFETY: only called during single threaded start-up and test initialization.
        unsafe { std::env::set_var(APP_ENVIRONMENT_ENV_NAME, self.to_string()) }
    }

    /// Returns `true` for [`Environment::Prod`] and [`Environment::Staging`].
    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod | Self::Staging)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Environment::Prod => PROD_ENV_NAME,
            Environment::Staging => STAGING_ENV_NAME,
            Environment::Dev => DEV_ENV_NAME,
        };

        f.write_str(name)
    }
}

impl FromStr for Environment {
    type Err = Error;

    /// Parses an [`Environment`] case-insensitively from `dev`, `staging` or `prod`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            PROD_ENV_NAME => Ok(Self::Prod),
            STAGING_ENV_NAME => Ok(Self::Staging),
            DEV_ENV_NAME => Ok(Self::Dev),
            other => Err(Error::other(format!(
                "{other} is not a supported environment. Use either `{PROD_ENV_NAME}`/`{STAGING_ENV_NAME}`/`{DEV_ENV_NAME}`.",
            ))),
        }
    }
}
