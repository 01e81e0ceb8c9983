//! Default values for configuration

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default environment variable name for Qdrant API key
pub fn default_qdrant_api_key_env() -> String {
    "".to_string()
}

/// Default collection name
pub fn default_collection_name() -> String {
    "guichet_docs".to_string()
}

/// Default embedding model (BAAI/bge-small-en-v1.5)
pub fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

/// Default embedding dimension (matches the default model)
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default embedding backend URL
pub fn default_embedding_backend_url() -> String {
    std::env::var("GUICHET_EMBEDDING_BACKEND_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7997".to_string())
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default chunk size in tokens
pub fn default_chunk_size() -> usize {
    512
}

/// Default overlap between consecutive chunks in tokens
pub fn default_chunk_overlap() -> usize {
    50
}

/// Default minimum chunk size in tokens
pub fn default_min_chunk_size() -> usize {
    5
}

/// Default maximum chunk size in tokens
pub fn default_max_chunk_size() -> usize {
    10_000
}

/// Default: prefer heading boundaries
pub fn default_prefer_heading_boundaries() -> bool {
    true
}

/// Default number of retrieved chunks
pub fn default_retrieval_top_k() -> usize {
    5
}

/// Default similarity threshold (only chunks above this score are used)
pub fn default_similarity_threshold() -> f32 {
    0.7
}

/// Default chat model identifier
pub fn default_chat_model() -> String {
    "gpt-4o".to_string()
}

/// Default chat backend URL (OpenAI-compatible)
pub fn default_chat_backend_url() -> String {
    std::env::var("GUICHET_CHAT_BACKEND_URL")
        .unwrap_or_else(|_| "https://api.openai.com".to_string())
}

/// Default environment variable name for the chat API key
pub fn default_chat_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Default sampling temperature
pub fn default_chat_temperature() -> f32 {
    0.7
}

/// Default completion token budget
pub fn default_chat_max_tokens() -> u32 {
    500
}

/// Default number of conversation turns kept in the recency window
pub fn default_memory_window() -> usize {
    10
}

/// Default number of model/tool rounds before a turn is abandoned
pub fn default_max_tool_rounds() -> usize {
    4
}

/// Default system instruction for the assistant
pub fn default_system_prompt() -> String {
    "Vous êtes un assistant bancaire intelligent pour une banque.\n\
     Vous aidez les clients avec:\n\
     - Informations sur les virements bancaires\n\
     - Gestion des bénéficiaires\n\
     - Procédures bancaires\n\
     - Interprétation de documents (RIB, factures)\n\
     \n\
     Règles:\n\
     - Répondez uniquement basé sur les documents fournis\n\
     - Si l'information n'est pas dans le contexte, dites \"Je ne sais pas\"\n\
     - Soyez professionnel et courtois\n\
     - N'inventez jamais d'informations\n"
        .to_string()
}

/// Default environment variable name for the analyzer API key
pub fn default_analysis_key_env() -> String {
    "GUICHET_ANALYSIS_KEY".to_string()
}

/// Default beneficiary service base URL
pub fn default_beneficiary_service_url() -> String {
    std::env::var("GUICHET_BENEFICIARY_SERVICE_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8081".to_string())
}

/// Default transfer service base URL
pub fn default_transfer_service_url() -> String {
    std::env::var("GUICHET_TRANSFER_SERVICE_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8082".to_string())
}

/// Default request timeout in seconds for outbound HTTP calls
pub fn default_http_timeout_secs() -> u64 {
    30
}

/// Default documents directory for bulk ingestion
pub fn default_documents_path() -> String {
    "documents".to_string()
}
