//! Session commands: login, logout, signup and language choice.

use super::{parse_locale, AppContext};

pub async fn login(ctx: &mut AppContext, email: &str, password: &str) -> Result<(), String> {
    let token = ctx
        .client
        .login(email, password)
        .await
        .map_err(|e| ctx.fail(e))?;

    ctx.session = ctx.session.clone().with_token(token);
    ctx.save_session()?;
    println!("{}", ctx.tr().t("cli.logged_in"));
    Ok(())
}

pub fn logout(ctx: &mut AppContext) -> Result<(), String> {
    ctx.session.sign_out();
    ctx.save_session()?;
    println!("{}", ctx.tr().t("cli.logged_out"));
    Ok(())
}

pub async fn signup(ctx: &AppContext, email: &str, password: &str) -> Result<(), String> {
    ctx.client
        .signup(email, password)
        .await
        .map_err(|e| ctx.fail(e))?;
    println!("{}", ctx.tr().t("cli.signed_up"));
    Ok(())
}

/// Without a code, print the active language; with one, store it.
pub fn locale(ctx: &mut AppContext, code: Option<&str>) -> Result<(), String> {
    let Some(code) = code else {
        let current = ctx.session.locale().code();
        println!("{}", ctx.tr().t_with("cli.locale_current", &[("locale", current)]));
        return Ok(());
    };

    let locale = parse_locale(code, &ctx.tr())?;
    ctx.session.set_locale(locale);
    ctx.save_session()?;
    println!("{}", ctx.tr().t_with("cli.locale_set", &[("locale", locale.code())]));
    Ok(())
}
