use thiserror::Error;

const NOT_FOUND_MESSAGE: &str =
    "指定された銘柄が見つかりませんでした。別の名前やシンボルで試してください。";
const FETCH_FAILED_MESSAGE: &str =
    "データの取得に失敗しました。しばらくしてから再度お試しください。";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Parse failure: {0}")]
    Parse(String),
}

impl DataError {
    /// Message shown to the user when a search fails
    pub fn user_message(&self) -> &'static str {
        match self {
            DataError::NotFound(_) => NOT_FOUND_MESSAGE,
            DataError::Upstream(_) | DataError::Parse(_) => FETCH_FAILED_MESSAGE,
        }
    }
}

impl From<reqwest::Error> for DataError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DataError::Parse(err.to_string())
        } else if err.status() == Some(reqwest::StatusCode::NOT_FOUND) {
            DataError::NotFound(err.to_string())
        } else {
            DataError::Upstream(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Parse(err.to_string())
    }
}
