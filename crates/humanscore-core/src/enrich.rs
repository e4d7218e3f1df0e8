use humanscore_schema::{AnalysisResult, Baselines};

/// Attaches every provider's baseline answer to the matching breakdown item.
/// A provider with no answer for a step gets an empty string, so each item
/// carries the same provider keys. Anything the model wrote into an item's
/// `baselines` is discarded.
pub fn enrich(mut result: AnalysisResult, baselines: &Baselines) -> AnalysisResult {
    for item in &mut result.breakdown {
        item.baselines.clear();
        for (provider, answers) in baselines {
            let text = answers.get(&item.step_number).cloned().unwrap_or_default();
            item.baselines.insert(provider.clone(), text);
        }
    }
    result
}
