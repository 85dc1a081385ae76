//! Hierarchy Cache: a derived, Redis-backed projection of the tag tree,
//! read on the hot path instead of the Primary Store.
//!
//! Two shapes per the contract: a hash `tag:{uuid}` holding the mutable
//! field record for a tag, and a sorted set `children:{parent_uuid|root}`
//! whose members are child tag UUIDs and whose scores are sibling
//! **position** values — "ordered set of child tag ids keyed by position as
//! score", taken literally. Writers update the cache after a successful
//! Primary Store commit; a failure here is logged, never fatal to the write
//! that already committed. Readers that find the cache empty or suspect can
//! fall back to [`rebuild_from_ps`].

pub mod error;

#[cfg(test)]
mod tests;

pub use error::Error;

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

const ROOT_KEY: &str = "root";

#[derive(Debug, Clone)]
pub struct HierarchyCacheConfig {
    pub host: String,
    pub port: u16,
}

impl HierarchyCacheConfig {
    fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

/// The mutable-field record cached per tag.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTag {
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub parent_id: Option<Uuid>,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct HierarchyCache {
    client: redis::Client,
}

impl HierarchyCache {
    pub fn connect(config: &HierarchyCacheConfig) -> Result<Self> {
        let client = redis::Client::open(config.redis_url())?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn children_key(parent: Option<Uuid>) -> String {
        match parent {
            Some(id) => format!("children:{id}"),
            None => format!("children:{ROOT_KEY}"),
        }
    }

    fn tag_key(uuid: Uuid) -> String {
        format!("tag:{uuid}")
    }

    pub async fn insert(&self, tag: &CachedTag) -> Result<()> {
        let mut conn = self.conn().await?;
        write_hash(&mut conn, tag).await?;
        let _: () = conn
            .zadd(Self::children_key(tag.parent_id), tag.uuid.to_string(), tag.position)
            .await?;
        Ok(())
    }

    /// Updates the cached record. If `old_parent_id` differs from
    /// `tag.parent_id` the entry is moved between sorted sets.
    pub async fn update(&self, tag: &CachedTag, old_parent_id: Option<Uuid>) -> Result<()> {
        let mut conn = self.conn().await?;
        write_hash(&mut conn, tag).await?;

        if old_parent_id != tag.parent_id {
            let _: () = conn
                .zrem(Self::children_key(old_parent_id), tag.uuid.to_string())
                .await?;
        }
        let _: () = conn
            .zadd(Self::children_key(tag.parent_id), tag.uuid.to_string(), tag.position)
            .await?;
        Ok(())
    }

    /// Removes a tag from the cache. When `recursive` is true, every
    /// descendant already present in the cache is removed too (discovered
    /// via the cache's own children sets, since HC has no closure table of
    /// its own).
    pub async fn delete(&self, uuid: Uuid, recursive: bool) -> Result<()> {
        let target = match self.get(uuid).await? {
            Some(t) => t,
            None => return Ok(()),
        };

        if recursive {
            let subtree = self.get_subtree(Some(uuid), 0).await?;
            for (_, children) in subtree {
                for child in children {
                    self.remove_single(child.uuid, child.parent_id).await?;
                }
            }
        }

        self.remove_single(uuid, target.parent_id).await
    }

    async fn remove_single(&self, uuid: Uuid, parent_id: Option<Uuid>) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(Self::tag_key(uuid)).await?;
        let _: () = conn
            .zrem(Self::children_key(parent_id), uuid.to_string())
            .await?;
        Ok(())
    }

    pub async fn get(&self, uuid: Uuid) -> Result<Option<CachedTag>> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> = conn.hgetall(Self::tag_key(uuid)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(parse_cached_tag(uuid, &fields)?))
    }

    /// Ordered children of `parent` (or the forest roots, when `None`), by
    /// ascending position.
    pub async fn get_children(&self, parent: Option<Uuid>) -> Result<Vec<CachedTag>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.zrange(Self::children_key(parent), 0, -1).await?;

        let mut children = Vec::with_capacity(ids.len());
        for id in ids {
            let uuid = Uuid::parse_str(&id).map_err(|e| Error::Malformed(e.to_string()))?;
            if let Some(tag) = self.get(uuid).await? {
                children.push(tag);
            }
        }
        Ok(children)
    }

    /// Depth-bounded breadth-first walk starting at `parent`. `max_depth =
    /// 0` means unbounded. Returns a mapping parent id -> ordered children,
    /// which the caller flattens into a tree.
    pub async fn get_subtree(
        &self,
        parent: Option<Uuid>,
        max_depth: u32,
    ) -> Result<HashMap<Option<Uuid>, Vec<CachedTag>>> {
        let mut result = HashMap::new();
        let mut frontier = vec![parent];
        let mut depth = 0u32;

        loop {
            if frontier.is_empty() {
                break;
            }
            if max_depth != 0 && depth >= max_depth {
                break;
            }

            let mut next_frontier = Vec::new();
            for node in frontier {
                let children = self.get_children(node).await?;
                next_frontier.extend(children.iter().map(|c| Some(c.uuid)));
                result.insert(node, children);
            }
            frontier = next_frontier;
            depth += 1;
        }

        Ok(result)
    }

    /// Rebuilds the entire cache from the Primary Store: scans tags, joins
    /// the closure relation at depth 1 for parent linkage, and repopulates
    /// every hash and sorted set. Used by readers when the cache is found
    /// empty or by an operator-triggered recovery.
    pub async fn rebuild_from_ps(&self, pool: &SqlitePool) -> Result<usize> {
        let rows: Vec<(String, String, String, Option<String>, i64, String, String)> =
            sqlx::query_as(
                "SELECT uuid, name, description, \
                 (SELECT p.uuid FROM tags p WHERE p.id = tags.parent_id), \
                 position, created_at, updated_at FROM tags ORDER BY parent_id, position",
            )
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Malformed(e.to_string()))?;

        let mut count = 0;
        for (uuid, name, description, parent_uuid, position, created_at, updated_at) in rows {
            let tag = CachedTag {
                uuid: Uuid::parse_str(&uuid).map_err(|e| Error::Malformed(e.to_string()))?,
                name,
                description,
                parent_id: parent_uuid
                    .map(|p| Uuid::parse_str(&p))
                    .transpose()
                    .map_err(|e| Error::Malformed(e.to_string()))?,
                position,
                created_at: created_at.parse().map_err(|_| Error::Malformed("created_at".into()))?,
                updated_at: updated_at.parse().map_err(|_| Error::Malformed("updated_at".into()))?,
            };
            self.insert(&tag).await?;
            count += 1;
        }
        Ok(count)
    }
}

async fn write_hash(conn: &mut redis::aio::MultiplexedConnection, tag: &CachedTag) -> Result<()> {
    let fields: Vec<(&str, String)> = vec![
        ("uuid", tag.uuid.to_string()),
        ("name", tag.name.clone()),
        ("description", tag.description.clone()),
        (
            "parent_id",
            tag.parent_id.map(|p| p.to_string()).unwrap_or_default(),
        ),
        ("position", tag.position.to_string()),
        ("created_at", tag.created_at.to_rfc3339()),
        ("updated_at", tag.updated_at.to_rfc3339()),
    ];
    let _: () = conn.hset_multiple(HierarchyCache::tag_key(tag.uuid), &fields).await?;
    Ok(())
}

fn parse_cached_tag(uuid: Uuid, fields: &HashMap<String, String>) -> Result<CachedTag> {
    let get = |key: &str| -> Result<&String> {
        fields
            .get(key)
            .ok_or_else(|| Error::Malformed(format!("missing field {key}")))
    };

    let parent_raw = get("parent_id")?;
    let parent_id = if parent_raw.is_empty() {
        None
    } else {
        Some(Uuid::parse_str(parent_raw).map_err(|e| Error::Malformed(e.to_string()))?)
    };

    Ok(CachedTag {
        uuid,
        name: get("name")?.clone(),
        description: get("description")?.clone(),
        parent_id,
        position: get("position")?
            .parse()
            .map_err(|_| Error::Malformed("position".into()))?,
        created_at: get("created_at")?
            .parse()
            .map_err(|_| Error::Malformed("created_at".into()))?,
        updated_at: get("updated_at")?
            .parse()
            .map_err(|_| Error::Malformed("updated_at".into()))?,
    })
}
