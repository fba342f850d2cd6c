#[cfg(test)]
use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

#[derive(Debug, PartialEq, Eq)]
pub struct Error {
    pub message: String,
}

/// An adapter for streaming byte chunks.
pub enum Chunks {
    Response(Response),
    #[cfg(test)]
    VecDeque(VecDeque<Result<Bytes, Error>>),
    /// Never yields anything.
    #[cfg(test)]
    Silent,
}

impl Chunks {
    pub fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    #[cfg(test)]
    pub fn from_vec_deque(vec: VecDeque<Bytes>) -> Self {
        Chunks::VecDeque(vec.into_iter().map(Ok).collect())
    }

    #[cfg(test)]
    pub fn from_results(vec: VecDeque<Result<Bytes, Error>>) -> Self {
        Chunks::VecDeque(vec)
    }

    /// Reads the next chunk, `None` once the body is exhausted.
    ///
    /// Dropping the returned future (or the whole adapter) releases the
    /// underlying connection.
    #[inline]
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response(response) => {
                response.chunk().await.map_err(|err| Error {
                    message: format!("{err}"),
                })
            }
            #[cfg(test)]
            Chunks::VecDeque(vec) => vec.pop_front().transpose(),
            #[cfg(test)]
            Chunks::Silent => std::future::pending().await,
        }
    }
}
