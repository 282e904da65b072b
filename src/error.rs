pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("queue already started")]
    AlreadyStarted,

    #[error("queue cancelled")]
    Cancelled,

    #[error("queue shut down")]
    ShutDown,

    #[error("executors still running")]
    Busy,

    #[error("command is not waitable")]
    NotWaitable,

    #[error("failed to spawn executor thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}
