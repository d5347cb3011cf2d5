use std::path::PathBuf;
use std::sync::Arc;

use delta_i18n::mt::{ChatTranslationProvider, MachineTranslator, MockMode, MockTranslator};
use delta_i18n::{
    CancellationToken, DocumentStatus, EngineConfig, RevisionJob, RevisionOrchestrator,
    TranslationMemory,
};
use tracing::{info, warn};

const REVISION_1: &str = r#"---
title: "Grid"
---

# Grid

Arranges content in a grid. Use `grid{:typst}` for layouts.

```typst
#grid(columns: 2)[a][b]
```

- Columns are set with `columns`
- Rows grow automatically
"#;

const REVISION_2: &str = r#"---
title: "Grid"
---

# Grid

Arranges content in a grid of cells. Use `grid{:typst}` for layouts.

```typst
#grid(columns: 2)[a][b]
```

- Columns are set with `columns`
- Rows grow automatically
- Gutters add space between cells
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    let config = EngineConfig::load_from(&PathBuf::from("delta-i18n.toml"))?;
    let memory_path = std::env::temp_dir().join("delta-i18n-memory.json");
    let memory = Arc::new(TranslationMemory::load(&memory_path)?);

    let provider: Arc<dyn MachineTranslator> = match ChatTranslationProvider::from_env() {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            warn!("{}; using the mock translator", e);
            Arc::new(MockTranslator::new(MockMode::Suffix))
        }
    };
    info!(provider = provider.provider_name(), memory = %memory_path.display(), "Starting delta-i18n demo");

    let orchestrator = RevisionOrchestrator::new(config, memory.clone(), provider)?;
    let cancel = CancellationToken::new();
    let target_locale = std::env::var("DELTA_I18N_TARGET").unwrap_or_else(|_| "fr".to_string());

    let revisions = [(None, REVISION_1, 1), (Some(REVISION_1), REVISION_2, 2)];
    for (old, new, revision) in revisions {
        let job = RevisionJob {
            document_id: "reference/layout/grid".to_string(),
            old_source: old.map(str::to_string),
            new_source: new.to_string(),
            source_locale: "en".to_string(),
            target_locale: target_locale.clone(),
            revision,
        };
        let outcome = orchestrator.run(&job, &cancel).await?;

        println!("===== revision {} =====", revision);
        println!("{}", outcome.document.text);
        println!("{}", serde_json::to_string_pretty(&outcome.stats)?);
        if let DocumentStatus::PartiallyTranslated { fallback_paths } = &outcome.document.status {
            for path in fallback_paths {
                println!("needs attention: chunk {}", path);
            }
        }
    }

    orchestrator.prune_memory();
    memory.save(&memory_path)?;
    info!(entries = memory.len(), "Saved translation memory");
    Ok(())
}
