//! Batched relation loading.
//!
//! A [`Relation`] resolves one association for a whole result set with a
//! single collector call, instead of one query per row:
//!
//! ```ignore
//! use qorm::eager::{Relation, RelationRegistry};
//!
//! let author = Relation::new(
//!     {
//!         let conn = conn.clone();
//!         move |ids: Vec<i64>| {
//!             let conn = conn.clone();
//!             async move {
//!                 let users: Vec<User> = qorm::table("users").where_in("id", ids).get_as(&conn).await?;
//!                 Ok(users.into_iter().map(|u| (u.id, u)).collect())
//!             }
//!         }
//!     },
//!     |post: &Post| Some(post.author_id),
//!     |post: &mut Post, user: Option<&User>| post.author = user.cloned(),
//! );
//! let registry = RelationRegistry::new().register("author", author);
//!
//! let posts: Vec<Post> = qorm::table("posts").with(&["author"]).get_with(&conn, &registry).await?;
//! ```

use crate::client::Executor;
use crate::error::{OrmError, OrmResult};
use crate::qb::QueryBuilder;
use crate::record::FromRecord;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;

type Collector<K, R> = Box<dyn Fn(Vec<K>) -> BoxFuture<'static, OrmResult<HashMap<K, R>>> + Send + Sync>;
type KeyFn<T, K> = Box<dyn Fn(&T) -> Option<K> + Send + Sync>;
type SetFn<T, R> = Box<dyn Fn(&mut T, Option<&R>) + Send + Sync>;

/// One association: how to key an item, how to fetch related values for a
/// batch of keys, and how to attach the result.
pub struct Relation<T, K, R> {
    collect: Collector<K, R>,
    key: KeyFn<T, K>,
    set: SetFn<T, R>,
}

impl<T, K, R> Relation<T, K, R>
where
    T: Send,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn new<C, Fut, KF, SF>(collect: C, key: KF, set: SF) -> Self
    where
        C: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OrmResult<HashMap<K, R>>> + Send + 'static,
        KF: Fn(&T) -> Option<K> + Send + Sync + 'static,
        SF: Fn(&mut T, Option<&R>) + Send + Sync + 'static,
    {
        Self {
            collect: Box::new(move |keys| collect(keys).boxed()),
            key: Box::new(key),
            set: Box::new(set),
        }
    }

    /// Load the relation for every item.
    ///
    /// Distinct keys go to the collector once, in first-seen order. Items
    /// without a key, or whose key the collector did not return, get `None`.
    pub async fn load(&self, items: &mut [T]) -> OrmResult<()> {
        let item_keys: Vec<Option<K>> = items.iter().map(|item| (self.key)(item)).collect();

        let mut seen = HashSet::new();
        let keys: Vec<K> = item_keys
            .iter()
            .flatten()
            .filter(|k| seen.insert((*k).clone()))
            .cloned()
            .collect();

        let related = if keys.is_empty() {
            HashMap::new()
        } else {
            (self.collect)(keys).await?
        };

        for (item, key) in items.iter_mut().zip(&item_keys) {
            (self.set)(item, key.as_ref().and_then(|k| related.get(k)));
        }
        Ok(())
    }
}

/// Object-safe view of a [`Relation`] with its key and related types erased.
trait Loader<T>: Send + Sync {
    fn load<'a>(&'a self, items: &'a mut [T]) -> BoxFuture<'a, OrmResult<()>>;
}

impl<T, K, R> Loader<T> for Relation<T, K, R>
where
    T: Send,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    fn load<'a>(&'a self, items: &'a mut [T]) -> BoxFuture<'a, OrmResult<()>> {
        Relation::load(self, items).boxed()
    }
}

/// Relations for one item type, addressed by tag.
pub struct RelationRegistry<T> {
    relations: HashMap<String, Box<dyn Loader<T>>>,
}

impl<T: Send + 'static> RelationRegistry<T> {
    pub fn new() -> Self {
        Self {
            relations: HashMap::new(),
        }
    }

    /// Register `relation` under `tag`, replacing any previous one.
    pub fn register<K, R>(mut self, tag: &str, relation: Relation<T, K, R>) -> Self
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        self.relations.insert(tag.to_string(), Box::new(relation));
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.relations.contains_key(tag)
    }

    /// Load each tagged relation in order.
    ///
    /// Every tag is checked before anything runs; an unknown tag fails with
    /// [`OrmError::Validation`].
    pub async fn load(&self, tags: &[String], items: &mut [T]) -> OrmResult<()> {
        if let Some(unknown) = tags.iter().find(|t| !self.contains(t)) {
            return Err(OrmError::validation(format!("unknown relation '{unknown}'")));
        }
        for tag in tags {
            if let Some(loader) = self.relations.get(tag) {
                tracing::debug!(target: "qorm.sql", relation = %tag, items = items.len(), "loading relation");
                loader.load(items).await?;
            }
        }
        Ok(())
    }
}

impl<T: Send + 'static> Default for RelationRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryBuilder {
    /// Fetch rows as `T`, then load every relation requested with `with`.
    pub async fn get_with<T, E>(&self, conn: &E, registry: &RelationRegistry<T>) -> OrmResult<Vec<T>>
    where
        T: FromRecord + Send + 'static,
        E: Executor,
    {
        let mut items: Vec<T> = self.get_as(conn).await?;
        if !items.is_empty() {
            registry.load(self.relations(), &mut items).await?;
        }
        Ok(items)
    }
}
