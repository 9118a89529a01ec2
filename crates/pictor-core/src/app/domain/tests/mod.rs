//! Domain tests:
//! - Scenarios: end-to-end flows through the conversation actor with test doubles
//! - Property tests: randomized action sequences against the reducer
