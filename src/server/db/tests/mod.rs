
use super::Database;

pub fn run_all_tests(db: &Database) {
    user::run_user_tests(db);

    deal::run_game_tests(db);
    deal::run_deal_tests(db);

    policy::run_policy_tests(db);
}
