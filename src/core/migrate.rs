//! Database migration and seeding over a scoped shell session.

use crate::deploy::{run_recorded, CommandRecord, ShellCommands};
use crate::error::Result;
use crate::ssh::{with_session, SessionOpener, ShellTarget};
use crate::utils::shell;
use crate::utils::template::{self, TemplateVars};

/// Run the migrate command, then one seed command per seeder in order.
///
/// Exit codes are recorded; non-zero exits are warnings. Blank seeder names
/// are ignored and an empty list skips seeding.
pub fn run_migrations(
    opener: &dyn SessionOpener,
    target: &ShellTarget,
    seeders: &[String],
    commands: &ShellCommands,
) -> Result<Vec<CommandRecord>> {
    with_session(opener, target, |session| {
        let mut records = Vec::with_capacity(seeders.len() + 1);

        log_status!("migrate", "Running migrations for {}", target.user);
        records.push(run_recorded(session, "migrate", &commands.migrate, &commands.migrate)?);

        for seeder in seeders.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            let cmd = template::render(&commands.seed, &[(TemplateVars::SEEDER, &shell::quote_arg(seeder))]);
            log_status!("migrate", "Seeding {}", seeder);
            records.push(run_recorded(session, "seed", &cmd, &cmd)?);
        }

        Ok(records)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeOpener, ScriptedShell};

    fn target() -> ShellTarget {
        ShellTarget {
            host: "203.0.113.7".to_string(),
            port: 22,
            user: "example".to_string(),
            password: String::new(),
            web_root: "public_html".to_string(),
        }
    }

    fn commands() -> ShellCommands {
        ShellCommands::from(&crate::defaults::builtin_defaults().shell)
    }

    #[test]
    fn migrates_then_seeds_in_order() {
        let shell = ScriptedShell::default();
        let opener = FakeOpener::new(shell.clone());
        let seeders = vec!["SubdomainSeeder".to_string(), "SeoSettingSeeder".to_string()];

        let records = run_migrations(&opener, &target(), &seeders, &commands()).unwrap();

        assert_eq!(
            shell.commands(),
            vec![
                "php artisan migrate --force",
                "php artisan db:seed --class=SubdomainSeeder --force",
                "php artisan db:seed --class=SeoSettingSeeder --force",
            ]
        );
        assert_eq!(records.len(), 3);
        assert_eq!(shell.closes(), 1);
    }

    #[test]
    fn empty_seeders_skip_seeding() {
        let shell = ScriptedShell::default();
        let opener = FakeOpener::new(shell.clone());

        run_migrations(&opener, &target(), &["  ".to_string()], &commands()).unwrap();
        assert_eq!(shell.commands(), vec!["php artisan migrate --force"]);
    }

    #[test]
    fn seeder_names_are_quoted() {
        let shell = ScriptedShell::default();
        let opener = FakeOpener::new(shell.clone());

        run_migrations(&opener, &target(), &["Foo; rm -rf /".to_string()], &commands()).unwrap();
        assert_eq!(
            shell.commands()[1],
            "php artisan db:seed --class='Foo; rm -rf /' --force"
        );
    }

    #[test]
    fn failing_migration_still_seeds() {
        let shell = ScriptedShell::default().exit_with("migrate", 1);
        let opener = FakeOpener::new(shell.clone());

        let records = run_migrations(&opener, &target(), &["UserSeeder".to_string()], &commands()).unwrap();

        assert!(records[0].is_warning());
        assert_eq!(records[0].log_line(), "migrate: `php artisan migrate --force` (exit code 1)");
        assert!(!records[1].is_warning());
    }
}
