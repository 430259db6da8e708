//! Identity-keyed article aggregation.
//!
//! [`ArticleStore`] keeps the *first* article seen for every identity.
//! Later articles with the same `id` are discarded, not merged or
//! overwritten, so feeding the same results twice (from two workers or from
//! a retried run) leaves the store unchanged.

use std::collections::HashMap;

use crate::models::Article;

#[derive(Debug, Default)]
pub struct ArticleStore {
    /// Position of each identity in `articles`.
    index: HashMap<String, usize>,
    articles: Vec<Article>,
}

impl ArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with articles known from earlier runs.
    pub fn from_articles(articles: impl IntoIterator<Item = Article>) -> Self {
        let mut store = Self::new();
        store.extend(articles);
        store
    }

    /// Insert `article` unless its identity is already stored.
    ///
    /// Returns `true` if the article was inserted.
    pub fn merge(&mut self, article: Article) -> bool {
        if self.index.contains_key(&article.id) {
            return false;
        }
        self.index.insert(article.id.clone(), self.articles.len());
        self.articles.push(article);
        true
    }

    /// Merge every article, returning how many were inserted.
    pub fn extend(&mut self, articles: impl IntoIterator<Item = Article>) -> usize {
        articles
            .into_iter()
            .map(|article| self.merge(article))
            .filter(|inserted| *inserted)
            .count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Article> {
        self.index.get(id).map(|&i| &self.articles[i])
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    /// Stored articles in insertion order.
    pub fn into_articles(self) -> Vec<Article> {
        self.articles
    }
}
