/// Unit tests against the public library API
mod codec_tests;
mod registry_tests;
