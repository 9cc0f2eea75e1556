use crate::base::opterror::{OptOutError, StoreOp};

#[test]
fn test_registry_unavailable_message() {
    let err = OptOutError::registry_unavailable("registry.json", "not found");
    assert_eq!(
        err.to_string(),
        "Registry feed registry.json unavailable: not found"
    );
}

#[test]
fn test_store_op_names() {
    assert_eq!(StoreOp::GetAll.to_string(), "getAll");
    assert_eq!(StoreOp::Set.to_string(), "set");
}

#[test]
fn test_error_messages() {
    let err = OptOutError::store(StoreOp::Remove, "permission denied");
    assert_eq!(
        err.to_string(),
        "Cookie store remove failed: permission denied"
    );
    assert_eq!(
        OptOutError::RegistryMissingCollection.to_string(),
        "Registry feed doesn't contain a `registry` collection"
    );
}
