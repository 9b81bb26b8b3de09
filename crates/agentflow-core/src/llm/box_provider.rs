//! BoxTextGenerationProvider -- object-safe dynamic dispatch wrapper.
//!
//! 1. Define an object-safe `TextGenerationProviderDyn` trait with boxed futures
//! 2. Blanket-impl it for all `T: TextGenerationProvider`
//! 3. `BoxTextGenerationProvider` wraps `Box<dyn TextGenerationProviderDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use super::provider::{Completion, GenerationError, GenerationRequest, TextGenerationProvider};

/// Object-safe version of [`TextGenerationProvider`] with boxed futures.
pub trait TextGenerationProviderDyn: Send + Sync {
    fn name(&self) -> &str;

    fn generate_boxed<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, GenerationError>> + Send + 'a>>;
}

impl<T: TextGenerationProvider> TextGenerationProviderDyn for T {
    fn name(&self) -> &str {
        TextGenerationProvider::name(self)
    }

    fn generate_boxed<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, GenerationError>> + Send + 'a>> {
        Box::pin(self.generate(request))
    }
}

/// Type-erased provider, chosen at runtime from configuration.
pub struct BoxTextGenerationProvider {
    inner: Box<dyn TextGenerationProviderDyn + Send + Sync>,
}

impl BoxTextGenerationProvider {
    pub fn new<T: TextGenerationProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<Completion, GenerationError> {
        self.inner.generate_boxed(request).await
    }
}

impl std::fmt::Debug for BoxTextGenerationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxTextGenerationProvider")
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProvider;

    impl TextGenerationProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<Completion, GenerationError> {
            Ok(Completion {
                text: request.prompt.to_uppercase(),
                model: "echo-1".to_string(),
                input_tokens: 1,
                output_tokens: 1,
            })
        }
    }

    #[tokio::test]
    async fn test_box_provider_delegates() {
        let provider = BoxTextGenerationProvider::new(EchoProvider);
        assert_eq!(provider.name(), "echo");
        let completion = provider
            .generate(&GenerationRequest::new("draft it"))
            .await
            .unwrap();
        assert_eq!(completion.text, "DRAFT IT");
    }
}
