use poise::serenity_prelude as serenity;

/// Permissions that mark a member as a moderator.
pub const MODERATOR_PERMISSIONS: serenity::Permissions = serenity::Permissions::MODERATE_MEMBERS
    .union(serenity::Permissions::KICK_MEMBERS)
    .union(serenity::Permissions::BAN_MEMBERS)
    .union(serenity::Permissions::MANAGE_MESSAGES);

/// Combine a member's guild-level permissions from the guild's role table.
///
/// The guild owner always resolves to every permission. The `@everyone` role
/// shares the guild's id and applies to every member.
pub fn combine_role_permissions<'a>(
    guild_id: serenity::GuildId,
    owner_id: serenity::UserId,
    user_id: serenity::UserId,
    member_roles: &[serenity::RoleId],
    roles: impl IntoIterator<Item = (&'a serenity::RoleId, serenity::Permissions)>,
) -> serenity::Permissions {
    if owner_id == user_id {
        return serenity::Permissions::all();
    }

    let everyone_role_id = serenity::RoleId::new(guild_id.get());
    roles
        .into_iter()
        .filter(|(id, _)| **id == everyone_role_id || member_roles.contains(id))
        .fold(serenity::Permissions::empty(), |acc, (_, perms)| acc | perms)
}

/// Whether a permission set carries administrator rights.
pub fn is_administrator(perms: serenity::Permissions) -> bool {
    perms.contains(serenity::Permissions::ADMINISTRATOR)
}

/// Whether a permission set carries any moderator right.
pub fn is_moderator(perms: serenity::Permissions) -> bool {
    is_administrator(perms) || perms.intersects(MODERATOR_PERMISSIONS)
}

#[cfg(test)]
mod tests {
    use poise::serenity_prelude as serenity;

    use super::{combine_role_permissions, is_administrator, is_moderator};

    #[test]
    fn moderator_rights_are_any_of_the_moderation_permissions() {
        assert!(is_moderator(serenity::Permissions::KICK_MEMBERS));
        assert!(is_moderator(
            serenity::Permissions::MANAGE_MESSAGES | serenity::Permissions::SEND_MESSAGES
        ));
        assert!(is_moderator(serenity::Permissions::ADMINISTRATOR));
        assert!(!is_moderator(serenity::Permissions::SEND_MESSAGES));
    }

    #[test]
    fn administrator_requires_the_flag() {
        assert!(is_administrator(serenity::Permissions::ADMINISTRATOR));
        assert!(!is_administrator(serenity::Permissions::BAN_MEMBERS));
    }

    #[test]
    fn member_permissions_come_from_everyone_and_held_roles() {
        let guild = serenity::GuildId::new(10);
        let owner = serenity::UserId::new(1);
        let member = serenity::UserId::new(7);
        let (everyone, mods, admins) = (
            serenity::RoleId::new(10),
            serenity::RoleId::new(20),
            serenity::RoleId::new(30),
        );
        let table = [
            (everyone, serenity::Permissions::SEND_MESSAGES),
            (mods, serenity::Permissions::KICK_MEMBERS),
            (admins, serenity::Permissions::ADMINISTRATOR),
        ];
        let roles = || table.iter().map(|(id, perms)| (id, *perms));

        let held = combine_role_permissions(guild, owner, member, &[mods], roles());
        assert_eq!(
            held,
            serenity::Permissions::SEND_MESSAGES | serenity::Permissions::KICK_MEMBERS
        );
        assert!(is_moderator(held));
        assert!(!is_administrator(held));

        let bare = combine_role_permissions(guild, owner, member, &[], roles());
        assert_eq!(bare, serenity::Permissions::SEND_MESSAGES);

        let owned = combine_role_permissions(guild, owner, owner, &[], roles());
        assert!(is_administrator(owned));
    }
}
