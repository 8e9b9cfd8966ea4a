use taskhub_shared::session::SessionUser;

/// The single ownership predicate applied before destructive operations:
/// only the user recorded on the entity (uploader, creator) may delete it.
/// Advisory only; the store itself enforces nothing.
pub fn can_delete(record_owner_id: &str, session: &SessionUser) -> bool {
    !record_owner_id.is_empty() && session.user_id == record_owner_id
}
