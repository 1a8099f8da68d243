use terjang::error::AppResult;

fn main() -> AppResult<()> {
    terjang::entry::run()
}
