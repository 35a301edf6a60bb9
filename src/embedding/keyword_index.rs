/// Tantivy keyword index for full-text search over message content
use crate::models::{Message, ResultKind, SearchFilter, SearchResult};
use chrono::DateTime;
use std::path::PathBuf;
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::*;
use tantivy::snippet::SnippetGenerator;
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer,
};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyError};
use thiserror::Error;
use uuid::Uuid;

/// Name under which the stemming analyzer is registered on the index
const ANALYZER_NAME: &str = "message_text";

#[derive(Error, Debug)]
pub enum KeywordIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Tantivy error: {0}")]
    TantivyError(#[from] TantivyError),

    #[error("Query parsing error: {0}")]
    QueryParseError(String),

    #[error("Unsupported analyzer language: {0}")]
    UnsupportedLanguage(String),
}

/// Map a configured language name to a stemmer language
pub fn analyzer_language(name: &str) -> Option<Language> {
    match name.to_lowercase().as_str() {
        "english" | "en" => Some(Language::English),
        "russian" | "ru" => Some(Language::Russian),
        "german" | "de" => Some(Language::German),
        "french" | "fr" => Some(Language::French),
        "spanish" | "es" => Some(Language::Spanish),
        "italian" | "it" => Some(Language::Italian),
        "portuguese" | "pt" => Some(Language::Portuguese),
        "dutch" | "nl" => Some(Language::Dutch),
        "swedish" | "sv" => Some(Language::Swedish),
        _ => None,
    }
}

struct Fields {
    id: Field,
    content: Field,
    interaction: Field,
    sender: Field,
    timestamp: Field,
}

impl Fields {
    fn from_schema(schema: &Schema) -> Result<Self, KeywordIndexError> {
        let get = |name: &str| {
            schema.get_field(name).map_err(|_| {
                KeywordIndexError::InitializationError(format!(
                    "Missing '{}' field in schema",
                    name
                ))
            })
        };
        Ok(Self {
            id: get("id")?,
            content: get("content")?,
            interaction: get("interaction_id")?,
            sender: get("sender_id")?,
            timestamp: get("timestamp")?,
        })
    }
}

/// Tantivy keyword index wrapper
///
/// Provides BM25-ranked full-text search with a stemming analyzer and
/// sender/time filters.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: Fields,
    highlight_chars: usize,
}

impl KeywordIndex {
    /// Open the index at `index_path`, creating it if needed
    pub fn new(
        index_path: PathBuf,
        language: &str,
        highlight_chars: usize,
    ) -> Result<Self, KeywordIndexError> {
        let language = analyzer_language(language)
            .ok_or_else(|| KeywordIndexError::UnsupportedLanguage(language.to_string()))?;

        let index = if index_path.join("meta.json").exists() {
            Index::open_in_dir(&index_path)
                .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?
        } else {
            std::fs::create_dir_all(&index_path)?;
            Index::create_in_dir(&index_path, Self::build_schema())
                .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?
        };

        // The analyzer is not persisted with the index, register it on every open
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(40))
            .filter(LowerCaser)
            .filter(Stemmer::new(language))
            .build();
        index.tokenizers().register(ANALYZER_NAME, analyzer);

        let fields = Fields::from_schema(&index.schema())?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
            highlight_chars,
        })
    }

    fn build_schema() -> Schema {
        let mut schema_builder = Schema::builder();

        let text_indexing = TextFieldIndexing::default()
            .set_tokenizer(ANALYZER_NAME)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let text_options = TextOptions::default()
            .set_indexing_options(text_indexing)
            .set_stored();

        schema_builder.add_u64_field("id", INDEXED | STORED | FAST);
        schema_builder.add_text_field("content", text_options);
        schema_builder.add_text_field("interaction_id", STRING | STORED);
        schema_builder.add_text_field("sender_id", STRING | STORED);
        schema_builder.add_i64_field("timestamp", INDEXED | STORED | FAST);

        schema_builder.build()
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, IndexWriter>, KeywordIndexError> {
        self.writer
            .lock()
            .map_err(|_| KeywordIndexError::InsertError("Index writer lock poisoned".to_string()))
    }

    /// Index a message. Messages without content are skipped (returns false).
    /// Re-inserting an id replaces the previous document on commit.
    pub fn insert(&self, message: &Message) -> Result<bool, KeywordIndexError> {
        let Some(content) = message.content.as_deref() else {
            return Ok(false);
        };

        let id = message.id as u64;
        let mut doc = TantivyDocument::default();
        doc.add_u64(self.fields.id, id);
        doc.add_text(self.fields.content, content);
        doc.add_text(self.fields.interaction, message.interaction_id.to_string());
        if let Some(sender) = message.sender_id {
            doc.add_text(self.fields.sender, sender.to_string());
        }
        doc.add_i64(self.fields.timestamp, message.timestamp.timestamp_millis());

        let writer = self.writer()?;
        writer.delete_term(Term::from_field_u64(self.fields.id, id));
        writer
            .add_document(doc)
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        Ok(true)
    }

    /// Insert multiple messages, returning how many were indexed
    pub fn insert_batch(&self, messages: &[Message]) -> Result<usize, KeywordIndexError> {
        let mut indexed = 0;
        for message in messages {
            if self.insert(message)? {
                indexed += 1;
            }
        }
        Ok(indexed)
    }

    /// Commit all pending changes
    pub fn commit(&self) -> Result<(), KeywordIndexError> {
        self.writer()?
            .commit()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        // Make the commit visible to searches immediately
        self.reader
            .reload()
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        Ok(())
    }

    /// Search the index
    ///
    /// # Arguments
    /// * `query` - Free text; malformed syntax is parsed leniently
    /// * `filter` - Sender and inclusive time window restrictions
    /// * `limit` - Maximum number of results
    ///
    /// # Returns
    /// Results sorted by BM25 relevance, each with an HTML highlight excerpt
    pub fn search(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchResult>, KeywordIndexError> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, vec![self.fields.content]);

        let (text_query, parse_errors) = query_parser.parse_query_lenient(query);
        if !parse_errors.is_empty() {
            tracing::debug!("Lenient parse of {:?} dropped {} part(s)", query, parse_errors.len());
        }

        let mut snippet_generator =
            SnippetGenerator::create(&searcher, text_query.as_ref(), self.fields.content)
                .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;
        snippet_generator.set_max_num_chars(self.highlight_chars);

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, text_query)];

        if let Some(entity) = filter.entity_id {
            let term = Term::from_field_text(self.fields.sender, &entity.to_string());
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
            ));
        }

        if let Some(period) = filter.period {
            let range = format!(
                "timestamp:[{} TO {}]",
                period.from.timestamp_millis(),
                period.to.timestamp_millis()
            );
            let range_query = query_parser
                .parse_query(&range)
                .map_err(|e| KeywordIndexError::QueryParseError(e.to_string()))?;
            clauses.push((Occur::Must, range_query));
        }

        let query = BooleanQuery::new(clauses);

        // TopDocs allocates its heap for the full limit up front
        let limit = limit.min(searcher.num_docs() as usize);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

            let highlight = snippet_generator.snippet_from_doc(&doc).to_html();
            results.push(self.to_result(&doc, score, highlight)?);
        }

        Ok(results)
    }

    fn to_result(
        &self,
        doc: &TantivyDocument,
        score: f32,
        highlight: String,
    ) -> Result<SearchResult, KeywordIndexError> {
        let invalid = |field: &str| {
            KeywordIndexError::SearchError(format!("Missing or invalid '{}' field", field))
        };

        let id = doc
            .get_first(self.fields.id)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| invalid("id"))?;

        let content = doc
            .get_first(self.fields.content)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let interaction_id = doc
            .get_first(self.fields.interaction)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| invalid("interaction_id"))?;

        let entity_id = doc
            .get_first(self.fields.sender)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());

        let timestamp = doc
            .get_first(self.fields.timestamp)
            .and_then(|v| v.as_i64())
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| invalid("timestamp"))?;

        Ok(SearchResult {
            id: id as i64,
            kind: ResultKind::Message,
            content,
            timestamp,
            entity_id,
            interaction_id,
            score,
            highlight: (!highlight.is_empty()).then_some(highlight),
        })
    }

    /// Delete a document by message id
    pub fn delete(&self, id: i64) -> Result<(), KeywordIndexError> {
        self.writer()?
            .delete_term(Term::from_field_u64(self.fields.id, id as u64));
        Ok(())
    }

    /// Clear the entire index
    pub fn clear(&self) -> Result<(), KeywordIndexError> {
        self.writer()?
            .delete_all_documents()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
        self.commit()?;
        Ok(())
    }

    /// Get the number of documents in the index
    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
