use compliance_bridge::catalog::read_controls;
use compliance_bridge::config::Config;
use compliance_bridge::embedding::{create_provider, EmbeddingProvider, HashingProvider};
use compliance_bridge::retrieval::{build_index, LocalRetriever};
use compliance_bridge::vector_index::FlatIndex;
use tempfile::TempDir;

const CATALOG: &str = "\
FedRAMP High Baseline,,,,,,,,,,
Count,SortID,Family,ControlID,ControlName,ControlDescription,Baseline,Justification,Assignment,Requirements,Parameter
1,AC-01,ACCESS CONTROL,AC-1,Access Control Policy and Procedures,Develop and disseminate an access control policy.,x,,,,
2,AC-02,ACCESS CONTROL,AC-2,Account Management,Manage information system accounts.,x,,,,
3,IR-04,INCIDENT RESPONSE,IR-4,Incident Handling,Implement an incident handling capability.,x,,,,
";

fn hashing_config(dir: &TempDir) -> Config {
    let mut config = Config::minimal();
    config.embedding.provider = "hashing".to_string();
    config.embedding.dims = Some(1024);
    config.retrieval.index_path = dir.path().join("index").join("controls.index");
    config.retrieval.contents_path = dir.path().join("index").join("controls.json");
    config
}

#[tokio::test]
async fn access_control_query_finds_ac1() {
    let dir = TempDir::new().unwrap();
    let config = hashing_config(&dir);
    let controls = read_controls(CATALOG.as_bytes()).unwrap();
    let provider = create_provider(&config.embedding).unwrap();

    assert_eq!(build_index(&controls, provider.as_ref(), &config).await.unwrap(), 3);
    assert!(config.retrieval.index_path.exists());
    assert!(config.retrieval.contents_path.exists());

    let retriever =
        LocalRetriever::open(&config.retrieval, create_provider(&config.embedding).unwrap()).unwrap();
    assert_eq!(retriever.len(), 3);

    let context = retriever.retrieve("access control policy", 1).await.unwrap();
    assert!(context.starts_with("AC-1 - Access Control Policy and Procedures"));
    assert!(!context.contains("AC-2"));
}

#[tokio::test]
async fn chunks_come_back_nearest_first() {
    let dir = TempDir::new().unwrap();
    let config = hashing_config(&dir);
    let controls = read_controls(CATALOG.as_bytes()).unwrap();
    let provider = create_provider(&config.embedding).unwrap();
    build_index(&controls, provider.as_ref(), &config).await.unwrap();

    let retriever = LocalRetriever::open(&config.retrieval, provider).unwrap();
    let chunks = retriever
        .retrieve_chunks("incident handling capability", 10)
        .await
        .unwrap();

    assert_eq!(chunks.len(), 3, "k is clamped to the index size");
    assert!(chunks[0].text.starts_with("IR-4"));
    assert!(chunks.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[tokio::test]
async fn joined_context_separates_chunks_with_blank_line() {
    let dir = TempDir::new().unwrap();
    let config = hashing_config(&dir);
    let controls = read_controls(CATALOG.as_bytes()).unwrap();
    let provider = create_provider(&config.embedding).unwrap();
    build_index(&controls, provider.as_ref(), &config).await.unwrap();

    let retriever = LocalRetriever::open(&config.retrieval, provider).unwrap();
    let context = retriever.retrieve("account management", 2).await.unwrap();
    assert_eq!(context.split("\n\n").count(), 2);
}

#[tokio::test]
async fn empty_catalog_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = hashing_config(&dir);
    let provider = create_provider(&config.embedding).unwrap();
    assert!(build_index(&[], provider.as_ref(), &config).await.is_err());
    assert!(!config.retrieval.index_path.exists());
}

#[test]
fn mismatched_pair_is_rejected() {
    let provider = HashingProvider::new(8);
    let mut index = FlatIndex::new(8);
    index.add(&[provider.embed_one("one")]).unwrap();

    let result = LocalRetriever::new(
        index,
        vec!["one".to_string(), "two".to_string()],
        Box::new(HashingProvider::new(8)),
    );
    assert!(result.is_err());
}

#[test]
fn dimension_mismatch_is_rejected() {
    let mut index = FlatIndex::new(8);
    index.add(&[vec![0.0; 8]]).unwrap();
    let provider: Box<dyn EmbeddingProvider> = Box::new(HashingProvider::new(16));
    assert!(LocalRetriever::new(index, vec!["x".to_string()], provider).is_err());
}
