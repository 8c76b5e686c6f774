//! Per-container binding: the association of a container handle with its
//! inferred schema, GraphQL type name and operation toggles.

use std::sync::Arc;

use store::ContainerOps;

use crate::config::{OperationKind, OperationsConfig};
use crate::infer::InferredSchema;
use crate::sdl::naming::{decapitalize, pluralize};

#[derive(Clone)]
pub struct ContainerBinding {
    /// Container name in the store.
    pub name: String,
    /// GraphQL type name for the root type.
    pub type_name: String,
    pub container: Arc<dyn ContainerOps>,
    pub schema: InferredSchema,
    /// Slash path, e.g. `/partition`.
    pub partition_key_path: String,
    pub operations: OperationsConfig,
    pub require_partition_key_on_queries: bool,
}

impl ContainerBinding {
    pub fn plural_type_name(&self) -> String {
        pluralize(&self.type_name)
    }

    /// Query field for a point read, e.g. `user`.
    pub fn point_field(&self) -> String {
        decapitalize(&self.type_name)
    }

    /// Query field for the paginated list, e.g. `users`.
    pub fn list_field(&self) -> String {
        decapitalize(&self.plural_type_name())
    }

    pub fn connection_type(&self) -> String {
        format!("{}Connection", self.plural_type_name())
    }

    pub fn result_type(&self) -> String {
        format!("{}Result", self.type_name)
    }

    /// Mutation field name for an operation, e.g. `createUser` or
    /// `createManyUsers`.
    pub fn mutation_field(&self, op: OperationKind) -> String {
        match op {
            OperationKind::Create => format!("create{}", self.type_name),
            OperationKind::Update => format!("update{}", self.type_name),
            OperationKind::Replace => format!("replace{}", self.type_name),
            OperationKind::Upsert => format!("upsert{}", self.type_name),
            OperationKind::Delete => format!("delete{}", self.type_name),
            OperationKind::SoftDelete => format!("softDelete{}", self.type_name),
            OperationKind::Restore => format!("restore{}", self.type_name),
            OperationKind::CreateMany => format!("createMany{}", self.plural_type_name()),
            OperationKind::UpdateMany => format!("updateMany{}", self.plural_type_name()),
            OperationKind::DeleteMany => format!("deleteMany{}", self.plural_type_name()),
            OperationKind::Increment => format!("increment{}", self.type_name),
            OperationKind::Decrement => format!("decrement{}", self.type_name),
        }
    }

    /// Operations enabled for this binding, in declaration order.
    pub fn enabled_operations(&self) -> Vec<OperationKind> {
        OperationKind::ALL
            .into_iter()
            .filter(|op| self.operations.enabled(*op))
            .collect()
    }

    /// The documented `id` fallback is only sound when the partition key
    /// actually is the id.
    pub fn partition_key_is_id(&self) -> bool {
        self.partition_key_path == "/id"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TypeSystemConfig;
    use crate::infer::infer_schema;
    use serde_json::json;
    use store::MemoryContainer;

    pub(crate) fn binding_for_tests(type_name: &str) -> ContainerBinding {
        let documents = vec![json!({"id": "1", "name": "a"})
            .as_object()
            .unwrap()
            .clone()];
        let schema = infer_schema(&documents, type_name, &TypeSystemConfig::default()).unwrap();
        ContainerBinding {
            name: "users".into(),
            type_name: type_name.into(),
            container: Arc::new(MemoryContainer::new("users", "/id")),
            schema,
            partition_key_path: "/id".into(),
            operations: OperationsConfig::default(),
            require_partition_key_on_queries: false,
        }
    }

    #[test]
    fn test_field_names() {
        let binding = binding_for_tests("User");
        assert_eq!(binding.point_field(), "user");
        assert_eq!(binding.list_field(), "users");
        assert_eq!(binding.connection_type(), "UsersConnection");
        assert_eq!(binding.result_type(), "UserResult");
    }

    #[test]
    fn test_mutation_field_names() {
        let binding = binding_for_tests("User");
        assert_eq!(binding.mutation_field(OperationKind::Create), "createUser");
        assert_eq!(binding.mutation_field(OperationKind::SoftDelete), "softDeleteUser");
        assert_eq!(binding.mutation_field(OperationKind::CreateMany), "createManyUsers");
        assert_eq!(binding.mutation_field(OperationKind::Decrement), "decrementUser");
    }

    #[test]
    fn test_partition_key_is_id() {
        let mut binding = binding_for_tests("User");
        assert!(binding.partition_key_is_id());
        binding.partition_key_path = "/tenant".into();
        assert!(!binding.partition_key_is_id());
    }
}
