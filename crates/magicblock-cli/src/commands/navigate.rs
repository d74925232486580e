use magicblock_core::Request;

use super::{dispatch, CliResult};

pub async fn run(url: String, frame_id: i64) -> CliResult {
    dispatch(Request::NavigationCompleted { url, frame_id }).await
}
