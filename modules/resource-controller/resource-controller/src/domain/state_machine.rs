//! Server-side validation of state attribute transitions.

use resource_controller_sdk::AttrValue;

use super::error::DomainError;
use super::schema::SchemaRegistry;

pub struct StateMachineValidator<'a> {
    registry: &'a SchemaRegistry,
    enabled: bool,
}

impl<'a> StateMachineValidator<'a> {
    #[must_use]
    pub fn new(registry: &'a SchemaRegistry, enabled: bool) -> Self {
        Self { registry, enabled }
    }

    /// Check `current -> requested` for `resource_type`.
    ///
    /// `current` is `None` while the resource is being created. Types without
    /// a state graph have nothing to validate. Values compare by string form.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` for an undeclared transition, `Configuration` for
    /// an unregistered resource type.
    pub fn validate(
        &self,
        resource_type: &str,
        current: Option<&AttrValue>,
        requested: &AttrValue,
    ) -> Result<(), DomainError> {
        if !self.enabled {
            return Ok(());
        }
        let schema = self.registry.require(resource_type)?;
        let Some(graph) = schema.state_graph() else {
            return Ok(());
        };

        let current = current.filter(|v| !v.is_null()).map(ToString::to_string);
        let requested = requested.to_string();
        if graph.allows(current.as_deref(), &requested) {
            return Ok(());
        }

        tracing::debug!(
            resource_type,
            attribute = %graph.attribute,
            from = current.as_deref().unwrap_or("<new>"),
            to = %requested,
            "Rejected state transition"
        );
        Err(DomainError::InvalidTransition {
            resource_type: resource_type.to_owned(),
            attribute: graph.attribute.clone(),
            from: current.unwrap_or_else(|| "<new>".to_owned()),
            to: requested,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{AttrKind, AttributeDecl, ResourceSchema, StateGraph};

    fn registry() -> SchemaRegistry {
        let order = ResourceSchema::builder("order")
            .attribute(AttributeDecl::new("status", AttrKind::String))
            .state_graph(
                StateGraph::new("status")
                    .initial("new")
                    .transition("new", "paid")
                    .transition("paid", "shipped"),
            )
            .build()
            .unwrap();
        let note = ResourceSchema::builder("note").build().unwrap();
        SchemaRegistry::new().with(order).unwrap().with(note).unwrap()
    }

    fn s(v: &str) -> AttrValue {
        AttrValue::String(v.to_owned())
    }

    #[test]
    fn illegal_transition_fails_only_when_enabled() {
        let registry = registry();
        let enabled = StateMachineValidator::new(&registry, true);
        let disabled = StateMachineValidator::new(&registry, false);

        let err = enabled
            .validate("order", Some(&s("new")), &s("shipped"))
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidTransition { ref from, ref to, .. } if from == "new" && to == "shipped"
        ));
        disabled
            .validate("order", Some(&s("new")), &s("shipped"))
            .unwrap();
    }

    #[test]
    fn legal_self_and_initial_transitions_pass() {
        let registry = registry();
        let validator = StateMachineValidator::new(&registry, true);
        validator.validate("order", Some(&s("new")), &s("paid")).unwrap();
        validator.validate("order", Some(&s("paid")), &s("paid")).unwrap();
        validator.validate("order", None, &s("new")).unwrap();
        assert!(validator.validate("order", None, &s("paid")).is_err());
    }

    #[test]
    fn non_string_states_compare_by_string_form() {
        let registry = SchemaRegistry::new()
            .with(
                ResourceSchema::builder("ticket")
                    .attribute(AttributeDecl::new("stage", AttrKind::Integer))
                    .state_graph(StateGraph::new("stage").initial("0").transition("0", "1"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let validator = StateMachineValidator::new(&registry, true);
        validator
            .validate("ticket", Some(&AttrValue::Integer(0)), &AttrValue::Integer(1))
            .unwrap();
        assert!(
            validator
                .validate("ticket", Some(&AttrValue::Integer(1)), &AttrValue::Integer(0))
                .is_err()
        );
    }

    #[test]
    fn unknown_type_is_configuration_error_and_graphless_type_passes() {
        let registry = registry();
        let validator = StateMachineValidator::new(&registry, true);
        assert!(matches!(
            validator.validate("invoice", None, &s("new")),
            Err(DomainError::Configuration(_))
        ));
        validator.validate("note", None, &s("anything")).unwrap();
    }
}
