use std::time::Duration;

use mongodb::{
    Client, Database,
    bson::{DateTime, doc},
    options::ClientOptions,
};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::error::{MongoDaoError, MongoResult};

const HANDSHAKE_ATTEMPTS: u32 = 10;
const FIRST_RETRY_DELAY: Duration = Duration::from_millis(250);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Build a client and wait until the deployment reports its clock.
///
/// Question deadlines and activity timestamps are stamped by the server, so a
/// deployment whose `hello` reply lacks `localTime` is rejected up front.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut attempt = 0;
    let mut delay = FIRST_RETRY_DELAY;
    loop {
        attempt += 1;
        match server_time(&database).await {
            Ok(now) => {
                debug!(attempt, server_time = %now, "MongoDB handshake succeeded");
                return Ok((client, database));
            }
            Err(MongoDaoError::ServerTime { source }) if attempt >= HANDSHAKE_ATTEMPTS => {
                return Err(MongoDaoError::Handshake {
                    attempts: attempt,
                    source,
                });
            }
            Err(MongoDaoError::ServerTime { source }) => {
                warn!(attempt, error = %source, ?delay, "MongoDB not reachable yet");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_RETRY_DELAY);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Current time according to the MongoDB server.
pub async fn server_time(database: &Database) -> MongoResult<DateTime> {
    let reply = database
        .run_command(doc! { "hello": 1 })
        .await
        .map_err(|source| MongoDaoError::ServerTime { source })?;
    reply
        .get_datetime("localTime")
        .copied()
        .map_err(|err| MongoDaoError::Corrupted {
            collection: "$cmd",
            reason: format!("hello reply without localTime: {err}"),
        })
}
